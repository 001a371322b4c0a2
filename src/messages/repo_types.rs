use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// A directed message between two users.
///
/// `(created_at, seq)` is unique and totally ordered across the store; `seq`
/// follows insertion order and breaks ties between equal timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub seq: i64,
    #[sqlx(rename = "sender_id")]
    pub sender: Uuid,
    #[sqlx(rename = "recipient_id")]
    pub recipient: Uuid,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub read: bool,
}

impl Message {
    pub fn order_key(&self) -> (OffsetDateTime, i64) {
        (self.created_at, self.seq)
    }

    /// The other participant as seen by `viewer`, or `None` if `viewer` is not a participant.
    pub fn partner_of(&self, viewer: Uuid) -> Option<Uuid> {
        if self.sender == viewer {
            Some(self.recipient)
        } else if self.recipient == viewer {
            Some(self.sender)
        } else {
            None
        }
    }

    /// Whether this message counts as unread for `viewer`.
    pub fn is_unread_for(&self, viewer: Uuid) -> bool {
        self.recipient == viewer && !self.read
    }

    pub fn is_between(&self, a: Uuid, b: Uuid) -> bool {
        (self.sender == a && self.recipient == b) || (self.sender == b && self.recipient == a)
    }
}
