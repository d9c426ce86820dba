//! SQLite chat store implementation.
//!
//! Implements `ChatStore` from `dawntasy-core` using sqlx with split
//! read/write pools: raw queries, private Row structs, reads on the reader
//! pool and every write on the single writer connection.
//!
//! Live subscriptions are served by an in-process [`SnapshotHub`]: writes
//! made through this store are published to its subscribers. Writes from
//! other processes sharing the file are not observed.
//!
//! A write and the publication of its snapshot happen under one lock, so
//! subscribers receive snapshots in commit order.

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;
use sqlx::sqlite::{Sqlite, SqliteRow};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use dawntasy_core::chat::store::{ChatStore, SnapshotStream};
use dawntasy_types::chat::{Chat, ChatMessage, MessageRole};
use dawntasy_types::error::RepositoryError;

use super::pool::DatabasePool;
use crate::store::SnapshotHub;

/// SQLite-backed implementation of `ChatStore`.
pub struct SqliteChatStore {
    pool: DatabasePool,
    hub: SnapshotHub,
    /// Held from transaction start until the snapshot is published.
    write_lock: Mutex<()>,
}

impl SqliteChatStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self {
            pool,
            hub: SnapshotHub::default(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    pub fn listener_count(&self, chat_id: &Uuid) -> usize {
        self.hub.listener_count(chat_id)
    }

    async fn load_chat(&self, chat_id: &Uuid) -> Result<Option<Chat>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM chats WHERE id = ?")
            .bind(chat_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut chat = ChatRow::from_row(&row).map_err(query_error)?.into_chat()?;

        let rows = sqlx::query("SELECT * FROM chat_messages WHERE chat_id = ? ORDER BY seq ASC")
            .bind(chat_id.to_string())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;
        chat.messages = rows_to_messages(&rows)?;

        Ok(Some(chat))
    }

    async fn load_owned(&self, chat_id: &Uuid, owner_id: &str) -> Result<Chat, RepositoryError> {
        let chat = self.load_chat(chat_id).await?.ok_or(RepositoryError::NotFound)?;
        if chat.owner_id != owner_id {
            return Err(RepositoryError::AccessDenied);
        }
        Ok(chat)
    }

    /// Publish the committed state of `chat_id` to live subscribers, if any.
    async fn publish(&self, chat_id: &Uuid) {
        if self.hub.listener_count(chat_id) == 0 {
            return;
        }
        match self.load_chat(chat_id).await {
            Ok(Some(chat)) => self.hub.publish(chat),
            Ok(None) => {}
            Err(e) => warn!(chat_id = %chat_id, error = %e, "Failed to load snapshot for subscribers"),
        }
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct ChatRow {
    id: String,
    owner_id: String,
    title: String,
    created_at: String,
    updated_at: String,
}

impl ChatRow {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            title: row.try_get("title")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_chat(self) -> Result<Chat, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid chat id: {e}")))?;

        Ok(Chat {
            id,
            title: self.title,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
            owner_id: self.owner_id,
            messages: Vec::new(),
        })
    }
}

struct ChatMessageRow {
    id: String,
    chat_id: String,
    role: String,
    content: String,
    timestamp: String,
}

impl ChatMessageRow {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            chat_id: row.try_get("chat_id")?,
            role: row.try_get("role")?,
            content: row.try_get("content")?,
            timestamp: row.try_get("timestamp")?,
        })
    }

    fn into_message(self) -> Result<ChatMessage, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid message id: {e}")))?;
        let role: MessageRole = self
            .role
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;

        Ok(ChatMessage {
            id,
            role,
            content: self.content,
            timestamp: parse_datetime(&self.timestamp)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn query_error(e: sqlx::Error) -> RepositoryError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            RepositoryError::Connection
        }
        other => RepositoryError::Query(other.to_string()),
    }
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

/// Fixed-width RFC 3339 so that text order is time order (and `MAX()` works).
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn rows_to_messages(rows: &[SqliteRow]) -> Result<Vec<ChatMessage>, RepositoryError> {
    let mut messages = Vec::with_capacity(rows.len());
    for row in rows {
        let message_row = ChatMessageRow::from_row(row).map_err(query_error)?;
        messages.push(message_row.into_message()?);
    }
    Ok(messages)
}

/// Check that `chat_id` exists and belongs to `owner_id`.
async fn authorize<'e, E>(executor: E, chat_id: &Uuid, owner_id: &str) -> Result<(), RepositoryError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let owner: Option<(String,)> = sqlx::query_as("SELECT owner_id FROM chats WHERE id = ?")
        .bind(chat_id.to_string())
        .fetch_optional(executor)
        .await
        .map_err(query_error)?;

    match owner {
        None => Err(RepositoryError::NotFound),
        Some((owner,)) if owner != owner_id => Err(RepositoryError::AccessDenied),
        Some(_) => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// ChatStore implementation
// ---------------------------------------------------------------------------

impl ChatStore for SqliteChatStore {
    async fn list_chats(&self, owner_id: &str) -> Result<Vec<Chat>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM chats WHERE owner_id = ? ORDER BY updated_at DESC")
            .bind(owner_id)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        let mut chats = Vec::with_capacity(rows.len());
        for row in &rows {
            chats.push(ChatRow::from_row(row).map_err(query_error)?.into_chat()?);
        }

        let message_rows = sqlx::query(
            r#"SELECT m.* FROM chat_messages m
               JOIN chats c ON c.id = m.chat_id
               WHERE c.owner_id = ?
               ORDER BY m.seq ASC"#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;

        let mut by_chat: HashMap<String, Vec<ChatMessage>> = HashMap::new();
        for row in &message_rows {
            let message_row = ChatMessageRow::from_row(row).map_err(query_error)?;
            let chat_id = message_row.chat_id.clone();
            by_chat.entry(chat_id).or_default().push(message_row.into_message()?);
        }
        for chat in &mut chats {
            if let Some(messages) = by_chat.remove(&chat.id.to_string()) {
                chat.messages = messages;
            }
        }

        Ok(chats)
    }

    async fn get_chat(&self, chat_id: &Uuid, owner_id: &str) -> Result<Chat, RepositoryError> {
        self.load_owned(chat_id, owner_id).await
    }

    async fn create_chat(&self, chat: &Chat) -> Result<(), RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;

        let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM chats WHERE id = ?")
            .bind(chat.id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(query_error)?;
        if existing.is_some() {
            return Err(RepositoryError::Conflict(format!("chat {} already exists", chat.id)));
        }

        sqlx::query(
            r#"INSERT INTO chats (id, owner_id, title, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(chat.id.to_string())
        .bind(&chat.owner_id)
        .bind(&chat.title)
        .bind(format_datetime(&chat.created_at))
        .bind(format_datetime(&chat.updated_at))
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        for message in &chat.messages {
            insert_message(&mut tx, &chat.id, message).await?;
        }

        tx.commit().await.map_err(query_error)?;
        debug!(chat_id = %chat.id, "Chat stored");
        Ok(())
    }

    async fn append_messages(
        &self,
        chat_id: &Uuid,
        owner_id: &str,
        messages: &[ChatMessage],
        updated_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let _serial = self.write_lock.lock().await;
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;
        authorize(&mut *tx, chat_id, owner_id).await?;

        let mut added = 0u64;
        for message in messages {
            added += insert_message(&mut tx, chat_id, message).await?;
        }

        sqlx::query("UPDATE chats SET updated_at = MAX(updated_at, ?) WHERE id = ?")
            .bind(format_datetime(&updated_at))
            .bind(chat_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;

        tx.commit().await.map_err(query_error)?;
        debug!(chat_id = %chat_id, added, "Messages appended");

        self.publish(chat_id).await;
        Ok(())
    }

    async fn set_title(&self, chat_id: &Uuid, owner_id: &str, title: &str) -> Result<(), RepositoryError> {
        let _serial = self.write_lock.lock().await;
        let mut tx = self.pool.writer.begin().await.map_err(query_error)?;
        authorize(&mut *tx, chat_id, owner_id).await?;

        sqlx::query("UPDATE chats SET title = ? WHERE id = ?")
            .bind(title)
            .bind(chat_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;

        tx.commit().await.map_err(query_error)?;
        self.publish(chat_id).await;
        Ok(())
    }

    async fn subscribe(&self, chat_id: &Uuid, owner_id: &str) -> Result<SnapshotStream, RepositoryError> {
        let listener = self.hub.listen(*chat_id);
        let initial = self.load_owned(chat_id, owner_id).await?;
        Ok(listener.into_stream(initial))
    }
}

/// Insert one message unless its id is already stored. Returns rows added.
async fn insert_message(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    chat_id: &Uuid,
    message: &ChatMessage,
) -> Result<u64, RepositoryError> {
    let result = sqlx::query(
        r#"INSERT OR IGNORE INTO chat_messages (id, chat_id, role, content, timestamp)
           VALUES (?, ?, ?, ?, ?)"#,
    )
    .bind(message.id.to_string())
    .bind(chat_id.to_string())
    .bind(message.role.to_string())
    .bind(&message.content)
    .bind(format_datetime(&message.timestamp))
    .execute(&mut **tx)
    .await
    .map_err(query_error)?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use dawntasy_types::chat::DEFAULT_CHAT_TITLE;
    use futures_util::StreamExt;
    use std::sync::Arc;

    async fn test_store() -> SqliteChatStore {
        let dir = tempfile::tempdir().unwrap();
        let url = super::super::pool::database_url(&dir.path().join("test.db"));
        // Leak tempdir so it lives for the test
        std::mem::forget(dir);
        SqliteChatStore::new(DatabasePool::new(&url).await.unwrap())
    }

    async fn seeded(store: &SqliteChatStore, owner: &str) -> Chat {
        let chat = Chat::new(owner, DEFAULT_CHAT_TITLE);
        store.create_chat(&chat).await.unwrap();
        chat
    }

    #[tokio::test]
    async fn test_create_and_get_chat() {
        let store = test_store().await;
        let chat = seeded(&store, "u1").await;

        let loaded = store.get_chat(&chat.id, "u1").await.unwrap();
        assert_eq!(loaded, chat);
    }

    #[tokio::test]
    async fn test_messages_keep_insertion_order_and_fields() {
        let store = test_store().await;
        let chat = seeded(&store, "u1").await;
        let question = ChatMessage::user("What is the Rift?");
        let answer = ChatMessage::assistant("The Rift is...");

        store
            .append_messages(&chat.id, "u1", &[question.clone()], question.timestamp)
            .await
            .unwrap();
        store
            .append_messages(&chat.id, "u1", &[answer.clone()], answer.timestamp)
            .await
            .unwrap();

        let loaded = store.get_chat(&chat.id, "u1").await.unwrap();
        assert_eq!(loaded.messages, vec![question, answer.clone()]);
        assert_eq!(loaded.updated_at, answer.timestamp);
    }

    #[tokio::test]
    async fn test_union_append_is_idempotent() {
        let store = test_store().await;
        let chat = seeded(&store, "u1").await;
        let message = ChatMessage::user("hello");

        for _ in 0..3 {
            store
                .append_messages(&chat.id, "u1", &[message.clone()], message.timestamp)
                .await
                .unwrap();
        }

        let loaded = store.get_chat(&chat.id, "u1").await.unwrap();
        assert_eq!(loaded.messages, vec![message]);
    }

    #[tokio::test]
    async fn test_concurrent_appends_all_survive() {
        let store = Arc::new(test_store().await);
        let chat = seeded(&store, "u1").await;

        let mut tasks = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            let chat_id = chat.id;
            tasks.push(tokio::spawn(async move {
                let message = ChatMessage::user(format!("message {i}"));
                store
                    .append_messages(&chat_id, "u1", &[message.clone()], message.timestamp)
                    .await
                    .unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let loaded = store.get_chat(&chat.id, "u1").await.unwrap();
        assert_eq!(loaded.messages.len(), 8);
    }

    #[tokio::test]
    async fn test_updated_at_never_moves_backwards() {
        let store = test_store().await;
        let chat = seeded(&store, "u1").await;
        let message = ChatMessage::user("late arrival");

        store
            .append_messages(&chat.id, "u1", &[message], chat.updated_at - Duration::hours(1))
            .await
            .unwrap();

        let loaded = store.get_chat(&chat.id, "u1").await.unwrap();
        assert_eq!(loaded.updated_at, chat.updated_at);
    }

    #[tokio::test]
    async fn test_ownership_is_enforced() {
        let store = test_store().await;
        let chat = seeded(&store, "u1").await;
        let message = ChatMessage::user("not mine");

        assert!(matches!(
            store.get_chat(&chat.id, "u2").await,
            Err(RepositoryError::AccessDenied)
        ));
        assert!(matches!(
            store
                .append_messages(&chat.id, "u2", &[message.clone()], message.timestamp)
                .await,
            Err(RepositoryError::AccessDenied)
        ));
        assert!(matches!(
            store.set_title(&chat.id, "u2", "hijacked").await,
            Err(RepositoryError::AccessDenied)
        ));
        assert!(matches!(
            store.subscribe(&chat.id, "u2").await,
            Err(RepositoryError::AccessDenied)
        ));
        assert!(matches!(
            store.set_title(&Uuid::now_v7(), "u1", "ghost").await,
            Err(RepositoryError::NotFound)
        ));
        assert_eq!(store.listener_count(&chat.id), 0);

        let untouched = store.get_chat(&chat.id, "u1").await.unwrap();
        assert!(untouched.messages.is_empty());
        assert_eq!(untouched.title, DEFAULT_CHAT_TITLE);
    }

    #[tokio::test]
    async fn test_list_chats_scoped_newest_first_with_messages() {
        let store = test_store().await;
        let older = seeded(&store, "u1").await;
        let newer = seeded(&store, "u1").await;
        seeded(&store, "u2").await;

        let message = ChatMessage::user("bump");
        store
            .append_messages(&newer.id, "u1", &[message.clone()], message.timestamp)
            .await
            .unwrap();

        let chats = store.list_chats("u1").await.unwrap();
        let ids: Vec<Uuid> = chats.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
        assert_eq!(chats[0].messages, vec![message]);
        assert!(chats[1].messages.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_create_conflicts() {
        let store = test_store().await;
        let chat = seeded(&store, "u1").await;

        assert!(matches!(
            store.create_chat(&chat).await,
            Err(RepositoryError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_subscription_sees_writes_through_this_store() {
        let store = test_store().await;
        let chat = seeded(&store, "u1").await;

        let mut snapshots = store.subscribe(&chat.id, "u1").await.unwrap();
        assert_eq!(store.listener_count(&chat.id), 1);
        assert_eq!(snapshots.next().await.unwrap().unwrap(), chat);

        let message = ChatMessage::user("live");
        store
            .append_messages(&chat.id, "u1", &[message.clone()], message.timestamp)
            .await
            .unwrap();
        let update = snapshots.next().await.unwrap().unwrap();
        assert_eq!(update.messages, vec![message]);

        store.set_title(&chat.id, "u1", "Live").await.unwrap();
        let update = snapshots.next().await.unwrap().unwrap();
        assert_eq!(update.title, "Live");

        drop(snapshots);
        assert_eq!(store.listener_count(&chat.id), 0);
    }

    #[tokio::test]
    async fn test_racing_writers_publish_in_commit_order() {
        let store = Arc::new(test_store().await);
        let chat = seeded(&store, "u1").await;
        let mut snapshots = store.subscribe(&chat.id, "u1").await.unwrap();
        snapshots.next().await.unwrap().unwrap();

        let mut tasks = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            let chat_id = chat.id;
            tasks.push(tokio::spawn(async move {
                if i == 4 {
                    store.set_title(&chat_id, "u1", "Live").await.unwrap();
                }
                let message = ChatMessage::user(format!("message {i}"));
                store
                    .append_messages(&chat_id, "u1", &[message.clone()], message.timestamp)
                    .await
                    .unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let mut counts = Vec::new();
        let mut titled = false;
        for _ in 0..9 {
            let snapshot = snapshots.next().await.unwrap().unwrap();
            if titled {
                assert_eq!(snapshot.title, "Live", "title went back to the default");
            }
            titled = snapshot.title == "Live";
            counts.push(snapshot.messages.len());
        }
        assert!(titled);
        assert!(counts.windows(2).all(|w| w[0] <= w[1]), "out of order: {counts:?}");
        assert_eq!(counts.last(), Some(&8));
    }

    #[test]
    fn test_datetime_format_is_fixed_width() {
        let whole = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let fractional = whole + Duration::microseconds(120);

        let a = format_datetime(&whole);
        let b = format_datetime(&fractional);
        assert_eq!(a, "2026-01-01T00:00:00.000000Z");
        assert_eq!(a.len(), b.len());
        assert!(a < b);
        assert_eq!(parse_datetime(&b).unwrap(), fractional);
    }
}
