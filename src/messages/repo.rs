use axum::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::messages::repo_types::Message;

/// Persistence for directed messages.
///
/// Implementations assign `created_at` (never earlier than any stored
/// message) and `seq` atomically with the insert.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert(&self, sender: Uuid, recipient: Uuid, content: &str) -> anyhow::Result<Message>;
    /// Messages between `a` and `b` in either direction, oldest first.
    async fn between(&self, a: Uuid, b: Uuid) -> anyhow::Result<Vec<Message>>;
    /// Every message `user` sent or received, oldest first.
    async fn involving(&self, user: Uuid) -> anyhow::Result<Vec<Message>>;
    /// Marks `partner -> reader` messages read in one atomic step. Returns how many flipped.
    async fn mark_read(&self, reader: Uuid, partner: Uuid) -> anyhow::Result<u64>;
}

const MESSAGE_COLUMNS: &str = "id, seq, sender_id, recipient_id, content, created_at, read";

#[derive(Clone)]
pub struct PgMessageStore {
    db: PgPool,
}

impl PgMessageStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn insert(&self, sender: Uuid, recipient: Uuid, content: &str) -> anyhow::Result<Message> {
        let msg = sqlx::query_as::<_, Message>(&format!(
            r#"
            INSERT INTO messages (sender_id, recipient_id, content, created_at)
            SELECT $1::uuid, $2::uuid, $3::text,
                   GREATEST(clock_timestamp(), COALESCE(MAX(created_at), '-infinity'::timestamptz))
            FROM messages
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(sender)
        .bind(recipient)
        .bind(content)
        .fetch_one(&self.db)
        .await?;
        Ok(msg)
    }

    async fn between(&self, a: Uuid, b: Uuid) -> anyhow::Result<Vec<Message>> {
        let rows = sqlx::query_as::<_, Message>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE (sender_id = $1 AND recipient_id = $2)
               OR (sender_id = $2 AND recipient_id = $1)
            ORDER BY created_at ASC, seq ASC
            "#
        ))
        .bind(a)
        .bind(b)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn involving(&self, user: Uuid) -> anyhow::Result<Vec<Message>> {
        let rows = sqlx::query_as::<_, Message>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE sender_id = $1 OR recipient_id = $1
            ORDER BY created_at ASC, seq ASC
            "#
        ))
        .bind(user)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn mark_read(&self, reader: Uuid, partner: Uuid) -> anyhow::Result<u64> {
        // A single statement only sees rows committed before it started.
        let res = sqlx::query(
            r#"
            UPDATE messages
            SET read = TRUE
            WHERE recipient_id = $1 AND sender_id = $2 AND NOT read
            "#,
        )
        .bind(reader)
        .bind(partner)
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected())
    }
}

#[derive(Default)]
struct MemoryInner {
    // kept in (created_at, seq) order by construction
    messages: Vec<Message>,
    next_seq: i64,
}

/// Process-local store used by the memory backend and tests.
#[derive(Default)]
pub struct MemoryMessageStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn insert(&self, sender: Uuid, recipient: Uuid, content: &str) -> anyhow::Result<Message> {
        let mut inner = self.inner.write().await;
        let now = OffsetDateTime::now_utc();
        let created_at = match inner.messages.last() {
            Some(last) if last.created_at > now => last.created_at,
            _ => now,
        };
        inner.next_seq += 1;
        let msg = Message {
            id: Uuid::new_v4(),
            seq: inner.next_seq,
            sender,
            recipient,
            content: content.to_string(),
            created_at,
            read: false,
        };
        inner.messages.push(msg.clone());
        Ok(msg)
    }

    async fn between(&self, a: Uuid, b: Uuid) -> anyhow::Result<Vec<Message>> {
        let inner = self.inner.read().await;
        Ok(inner
            .messages
            .iter()
            .filter(|m| m.is_between(a, b))
            .cloned()
            .collect())
    }

    async fn involving(&self, user: Uuid) -> anyhow::Result<Vec<Message>> {
        let inner = self.inner.read().await;
        Ok(inner
            .messages
            .iter()
            .filter(|m| m.partner_of(user).is_some())
            .cloned()
            .collect())
    }

    async fn mark_read(&self, reader: Uuid, partner: Uuid) -> anyhow::Result<u64> {
        let mut inner = self.inner.write().await;
        let mut updated = 0;
        for m in inner
            .messages
            .iter_mut()
            .filter(|m| m.recipient == reader && m.sender == partner && !m.read)
        {
            m.read = true;
            updated += 1;
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn insert_assigns_increasing_order_keys() {
        let store = MemoryMessageStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let first = store.insert(a, b, "one").await.unwrap();
        let second = store.insert(b, a, "two").await.unwrap();
        assert!(!first.read);
        assert!(second.order_key() > first.order_key());
        assert!(second.created_at >= first.created_at);
    }

    #[tokio::test]
    async fn between_is_symmetric_and_excludes_third_parties() {
        let store = MemoryMessageStore::new();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        store.insert(a, b, "a->b").await.unwrap();
        store.insert(c, a, "c->a").await.unwrap();
        store.insert(b, a, "b->a").await.unwrap();

        let ab = store.between(a, b).await.unwrap();
        let ba = store.between(b, a).await.unwrap();
        assert_eq!(ab, ba);
        let contents: Vec<_> = ab.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["a->b", "b->a"]);
        assert_eq!(store.involving(a).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn mark_read_only_touches_incoming_from_partner() {
        let store = MemoryMessageStore::new();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        store.insert(b, a, "1").await.unwrap();
        store.insert(b, a, "2").await.unwrap();
        store.insert(a, b, "mine").await.unwrap();
        store.insert(c, a, "other").await.unwrap();

        assert_eq!(store.mark_read(a, b).await.unwrap(), 2);
        assert_eq!(store.mark_read(a, b).await.unwrap(), 0);

        let all = store.involving(a).await.unwrap();
        let mine = all.iter().find(|m| m.content == "mine").unwrap();
        let other = all.iter().find(|m| m.content == "other").unwrap();
        assert!(!mine.read, "outgoing messages are never flipped by the sender");
        assert!(!other.read);
    }

    #[tokio::test]
    async fn concurrent_inserts_get_unique_totally_ordered_keys() {
        let store = Arc::new(MemoryMessageStore::new());
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let (from, to) = if i % 2 == 0 { (a, b) } else { (b, a) };
                store.insert(from, to, &format!("m{i}")).await.unwrap()
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let thread = store.between(a, b).await.unwrap();
        assert_eq!(thread.len(), 32);
        for pair in thread.windows(2) {
            assert!(pair[0].order_key() < pair[1].order_key());
        }
    }
}
