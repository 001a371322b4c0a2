//! Conversation view derived from stored messages.
//!
//! Nothing here is persisted: the list is folded from the viewer's messages
//! on every request, so it cannot drift from the message store.

use std::collections::HashMap;

use uuid::Uuid;

use crate::messages::repo_types::Message;

/// One thread as seen by a viewing user, before the partner is resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Thread {
    pub partner: Uuid,
    pub last_message: Option<Message>,
    pub unread_count: u64,
}

impl Thread {
    /// Thread with no history, used for first contact.
    pub fn empty(partner: Uuid) -> Self {
        Self {
            partner,
            last_message: None,
            unread_count: 0,
        }
    }
}

/// Groups `messages` by partner of `viewer`, one entry per partner, most
/// recent activity first. Messages the viewer is not part of are ignored.
pub fn aggregate<I>(viewer: Uuid, messages: I) -> Vec<Thread>
where
    I: IntoIterator<Item = Message>,
{
    let mut by_partner: HashMap<Uuid, Thread> = HashMap::new();

    for msg in messages {
        let Some(partner) = msg.partner_of(viewer) else {
            continue;
        };
        let thread = by_partner
            .entry(partner)
            .or_insert_with(|| Thread::empty(partner));

        if msg.is_unread_for(viewer) {
            thread.unread_count += 1;
        }
        let newer = thread
            .last_message
            .as_ref()
            .map_or(true, |last| msg.order_key() > last.order_key());
        if newer {
            thread.last_message = Some(msg);
        }
    }

    let mut threads: Vec<Thread> = by_partner.into_values().collect();
    threads.sort_by(|a, b| {
        let ka = a.last_message.as_ref().map(Message::order_key);
        let kb = b.last_message.as_ref().map(Message::order_key);
        kb.cmp(&ka)
    });
    threads
}
