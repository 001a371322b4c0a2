use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    messages::{
        conversations::{aggregate, Thread},
        dto::Conversation,
        repo_types::Message,
    },
    state::AppState,
    users::{dto::UserView, repo_types::User, services::require_user},
};

/// Stores a new unread message from `sender` to `recipient`.
pub async fn send(
    state: &AppState,
    sender: Uuid,
    recipient: Uuid,
    content: &str,
) -> AppResult<Message> {
    if content.trim().is_empty() {
        return Err(AppError::validation("Message content cannot be empty"));
    }
    if sender == recipient {
        return Err(AppError::validation("Cannot send a message to yourself"));
    }
    require_user(state, sender).await?;
    if !state.users.exists(recipient).await? {
        warn!(%sender, %recipient, "message to unknown recipient");
        return Err(AppError::validation("Recipient does not exist"));
    }

    let msg = state.messages.insert(sender, recipient, content).await?;
    info!(message_id = %msg.id, %sender, %recipient, "message sent");
    Ok(msg)
}

/// Full thread between `user` and `partner`, oldest first.
pub async fn list_conversation(
    state: &AppState,
    user: Uuid,
    partner: Uuid,
) -> AppResult<Vec<Message>> {
    ensure_partner(state, user, partner).await?;
    Ok(state.messages.between(user, partner).await?)
}

/// Marks everything `partner` sent to `reader` as read.
pub async fn mark_read(state: &AppState, reader: Uuid, partner: Uuid) -> AppResult<u64> {
    ensure_partner(state, reader, partner).await?;
    let updated = state.messages.mark_read(reader, partner).await?;
    debug!(%reader, %partner, updated, "messages marked read");
    Ok(updated)
}

/// One entry per partner `user` has exchanged messages with, most recent first.
pub async fn list_conversations(state: &AppState, user: Uuid) -> AppResult<Vec<Conversation>> {
    require_user(state, user).await?;
    let threads = aggregate(user, state.messages.involving(user).await?);

    let mut conversations = Vec::with_capacity(threads.len());
    for thread in threads {
        match state.users.get(thread.partner).await? {
            Some(partner) => conversations.push(with_partner(thread, partner.into())),
            None => warn!(%user, partner = %thread.partner, "conversation partner missing; skipped"),
        }
    }
    Ok(conversations)
}

/// The conversation with `partner`, or an empty shell when there is no history yet.
pub async fn conversation_with(
    state: &AppState,
    user: Uuid,
    partner: Uuid,
) -> AppResult<Conversation> {
    let partner_user = ensure_partner(state, user, partner).await?;
    let thread = aggregate(user, state.messages.between(user, partner).await?)
        .into_iter()
        .next()
        .unwrap_or_else(|| Thread::empty(partner));
    Ok(with_partner(thread, partner_user.into()))
}

async fn ensure_partner(
    state: &AppState,
    user: Uuid,
    partner: Uuid,
) -> AppResult<User> {
    if user == partner {
        return Err(AppError::validation("Partner must be another user"));
    }
    require_user(state, user).await?;
    require_user(state, partner).await
}

fn with_partner(thread: Thread, partner: UserView) -> Conversation {
    Conversation {
        partner,
        last_message: thread.last_message,
        unread_count: thread.unread_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::repo_types::{NewUser, Profile, Role};

    async fn seed(state: &AppState, name: &str) -> User {
        state
            .users
            .create(NewUser {
                name: name.into(),
                email: format!("{}@example.com", name.to_lowercase()),
                password_hash: "hash".into(),
                role: Role::Patient,
                profile: Profile::default(),
            })
            .await
            .expect("seed user")
    }

    #[tokio::test]
    async fn hi_hello_scenario() {
        let state = AppState::in_memory();
        let a = seed(&state, "Alice").await;
        let b = seed(&state, "Bob").await;

        send(&state, a.id, b.id, "hi").await.unwrap();
        send(&state, b.id, a.id, "hello").await.unwrap();

        let convs = list_conversations(&state, a.id).await.unwrap();
        assert_eq!(convs.len(), 1);
        assert_eq!(convs[0].partner.id, b.id);
        assert_eq!(convs[0].last_message.as_ref().unwrap().content, "hello");
        assert_eq!(convs[0].unread_count, 1);

        assert_eq!(mark_read(&state, a.id, b.id).await.unwrap(), 1);
        let convs = list_conversations(&state, a.id).await.unwrap();
        assert_eq!(convs[0].unread_count, 0);
    }

    #[tokio::test]
    async fn mark_read_is_idempotent() {
        let state = AppState::in_memory();
        let a = seed(&state, "Alice").await;
        let b = seed(&state, "Bob").await;
        send(&state, b.id, a.id, "one").await.unwrap();
        send(&state, b.id, a.id, "two").await.unwrap();

        assert_eq!(mark_read(&state, a.id, b.id).await.unwrap(), 2);
        assert_eq!(mark_read(&state, a.id, b.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn message_sent_after_mark_read_stays_unread() {
        let state = AppState::in_memory();
        let a = seed(&state, "Alice").await;
        let b = seed(&state, "Bob").await;
        send(&state, b.id, a.id, "before").await.unwrap();
        mark_read(&state, a.id, b.id).await.unwrap();
        send(&state, b.id, a.id, "after").await.unwrap();

        let thread = list_conversation(&state, a.id, b.id).await.unwrap();
        assert!(thread[0].read);
        assert!(!thread[1].read);
    }

    #[tokio::test]
    async fn thread_is_symmetric_and_ordered() {
        let state = AppState::in_memory();
        let a = seed(&state, "Alice").await;
        let b = seed(&state, "Bob").await;
        for (i, (from, to)) in [(a.id, b.id), (b.id, a.id), (a.id, b.id), (a.id, b.id)]
            .into_iter()
            .enumerate()
        {
            send(&state, from, to, &format!("m{i}")).await.unwrap();
        }

        let ab = list_conversation(&state, a.id, b.id).await.unwrap();
        let ba = list_conversation(&state, b.id, a.id).await.unwrap();
        assert_eq!(ab, ba);
        let contents: Vec<_> = ab.iter().map(|m| m.content.clone()).collect();
        assert_eq!(contents, ["m0", "m1", "m2", "m3"]);
        for pair in ab.windows(2) {
            assert!(pair[0].order_key() < pair[1].order_key());
        }
    }

    #[tokio::test]
    async fn conversations_never_repeat_a_partner() {
        let state = AppState::in_memory();
        let a = seed(&state, "Alice").await;
        let b = seed(&state, "Bob").await;
        let c = seed(&state, "Carol").await;
        for _ in 0..5 {
            send(&state, a.id, b.id, "to b").await.unwrap();
            send(&state, b.id, a.id, "from b").await.unwrap();
        }
        send(&state, c.id, a.id, "from c").await.unwrap();

        let convs = list_conversations(&state, a.id).await.unwrap();
        assert_eq!(convs.len(), 2);
        assert_eq!(convs[0].partner.id, c.id, "most recent activity first");
        assert_eq!(convs[1].partner.id, b.id);
        assert_eq!(convs[1].unread_count, 5);
    }

    #[tokio::test]
    async fn shell_for_first_contact() {
        let state = AppState::in_memory();
        let a = seed(&state, "Alice").await;
        let c = seed(&state, "Carol").await;

        let conv = conversation_with(&state, a.id, c.id).await.unwrap();
        assert_eq!(conv.partner.id, c.id);
        assert!(conv.last_message.is_none());
        assert_eq!(conv.unread_count, 0);
        assert!(list_conversations(&state, a.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn conversation_with_existing_history() {
        let state = AppState::in_memory();
        let a = seed(&state, "Alice").await;
        let b = seed(&state, "Bob").await;
        send(&state, b.id, a.id, "hey").await.unwrap();

        let conv = conversation_with(&state, a.id, b.id).await.unwrap();
        assert_eq!(conv.last_message.unwrap().content, "hey");
        assert_eq!(conv.unread_count, 1);
    }

    #[tokio::test]
    async fn send_validation() {
        let state = AppState::in_memory();
        let a = seed(&state, "Alice").await;
        let b = seed(&state, "Bob").await;

        let err = send(&state, a.id, a.id, "x").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = send(&state, a.id, Uuid::new_v4(), "x").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = send(&state, a.id, b.id, "   \n\t").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn unknown_users_are_not_found() {
        let state = AppState::in_memory();
        let a = seed(&state, "Alice").await;
        let ghost = Uuid::new_v4();

        assert!(matches!(
            list_conversations(&state, ghost).await.unwrap_err(),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            conversation_with(&state, a.id, ghost).await.unwrap_err(),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            mark_read(&state, a.id, ghost).await.unwrap_err(),
            AppError::NotFound(_)
        ));
        assert!(list_conversations(&state, a.id).await.unwrap().is_empty());
        assert!(list_conversation(&state, a.id, seed(&state, "Bob").await.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn unknown_sender_is_rejected_and_nothing_stored() {
        let state = AppState::in_memory();
        let b = seed(&state, "Bob").await;
        let ghost = Uuid::new_v4();

        let err = send(&state, ghost, b.id, "hi").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(state.messages.involving(b.id).await.unwrap().is_empty());

        assert!(matches!(
            list_conversation(&state, ghost, b.id).await.unwrap_err(),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            mark_read(&state, ghost, b.id).await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }
}
