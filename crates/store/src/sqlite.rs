//! SQLite transcript store.
//!
//! Uses a single SQLite database file with two tables:
//! - `threads`  — thread identity and metadata
//! - `messages` — one row per message, serialized as JSON
//!
//! Message ordering is an `AUTOINCREMENT` sequence column assigned inside
//! the append transaction, so insertion order is the only sort key —
//! timestamps are stored but never used for ordering.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use threadline_core::error::StoreError;
use threadline_core::message::{Message, Thread, ThreadId};
use threadline_core::store::TranscriptStore;
use tracing::{debug, info};

/// A production SQLite transcript store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new SQLite store from a file path.
    ///
    /// The database and all tables/indexes are created automatically.
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Unavailable(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite transcript store initialized at {path}");
        Ok(store)
    }

    /// Run schema migrations — creates the thread and message tables.
    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS threads (
                id         TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                metadata   TEXT NOT NULL DEFAULT '{}'
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Migration(format!("threads table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                seq        INTEGER PRIMARY KEY AUTOINCREMENT,
                id         TEXT UNIQUE NOT NULL,
                thread_id  TEXT NOT NULL REFERENCES threads(id) ON DELETE CASCADE,
                body       TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Migration(format!("messages table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_thread_id ON messages(thread_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Migration(format!("thread_id index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_thread(row: &sqlx::sqlite::SqliteRow) -> Result<Thread, StoreError> {
        let id: String = row.get("id");
        let created_at: String = row.get("created_at");
        let metadata: String = row.get("metadata");

        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| StoreError::Query(format!("Bad created_at for thread {id}: {e}")))?
            .with_timezone(&Utc);
        let metadata: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(&metadata)
                .map_err(|e| StoreError::Query(format!("Bad metadata for thread {id}: {e}")))?;

        Ok(Thread {
            id: ThreadId(id),
            created_at,
            metadata,
        })
    }
}

#[async_trait]
impl TranscriptStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn create_thread(
        &self,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Thread, StoreError> {
        let thread = Thread::new(metadata);
        sqlx::query("INSERT INTO threads (id, created_at, metadata) VALUES (?, ?, ?)")
            .bind(&thread.id.0)
            .bind(thread.created_at.to_rfc3339())
            .bind(serde_json::to_string(&thread.metadata).unwrap_or_else(|_| "{}".into()))
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Query(format!("create_thread: {e}")))?;
        Ok(thread)
    }

    async fn ensure_thread(&self, id: &ThreadId) -> Result<(), StoreError> {
        sqlx::query("INSERT OR IGNORE INTO threads (id, created_at, metadata) VALUES (?, ?, '{}')")
            .bind(&id.0)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Query(format!("ensure_thread: {e}")))?;
        Ok(())
    }

    async fn thread_exists(&self, id: &ThreadId) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM threads WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Query(format!("thread_exists: {e}")))?;
        Ok(row.is_some())
    }

    async fn get_thread(&self, id: &ThreadId) -> Result<Option<Thread>, StoreError> {
        let row = sqlx::query("SELECT id, created_at, metadata FROM threads WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Query(format!("get_thread: {e}")))?;

        row.map(|r| Self::row_to_thread(&r)).transpose()
    }

    async fn append_messages(
        &self,
        id: &ThreadId,
        messages: &[Message],
    ) -> Result<(), StoreError> {
        if messages.is_empty() {
            return Ok(());
        }
        if !self.thread_exists(id).await? {
            return Err(StoreError::ThreadNotFound(id.0.clone()));
        }

        // One transaction per batch: either every message lands, in caller
        // order, or none do.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Unavailable(format!("begin append: {e}")))?;

        for message in messages {
            let body = serde_json::to_string(message)
                .map_err(|e| StoreError::Query(format!("serialize message: {e}")))?;
            sqlx::query(
                "INSERT INTO messages (id, thread_id, body, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(&message.id)
            .bind(&id.0)
            .bind(body)
            .bind(message.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Query(format!("append message: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Unavailable(format!("commit append: {e}")))?;
        Ok(())
    }

    async fn list_messages(&self, id: &ThreadId) -> Result<Vec<Message>, StoreError> {
        if !self.thread_exists(id).await? {
            return Err(StoreError::ThreadNotFound(id.0.clone()));
        }

        let rows = sqlx::query("SELECT body FROM messages WHERE thread_id = ? ORDER BY seq ASC")
            .bind(&id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Query(format!("list_messages: {e}")))?;

        rows.iter()
            .map(|row| {
                let body: String = row.get("body");
                serde_json::from_str(&body)
                    .map_err(|e| StoreError::Query(format!("deserialize message: {e}")))
            })
            .collect()
    }

    async fn clear_messages(&self, id: &ThreadId) -> Result<u64, StoreError> {
        if !self.thread_exists(id).await? {
            return Err(StoreError::ThreadNotFound(id.0.clone()));
        }

        let result = sqlx::query("DELETE FROM messages WHERE thread_id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Query(format!("clear_messages: {e}")))?;
        Ok(result.rows_affected())
    }

    async fn delete_thread(&self, id: &ThreadId) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Unavailable(format!("begin delete: {e}")))?;

        sqlx::query("DELETE FROM messages WHERE thread_id = ?")
            .bind(&id.0)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Query(format!("delete messages: {e}")))?;
        sqlx::query("DELETE FROM threads WHERE id = ?")
            .bind(&id.0)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Query(format!("delete thread: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Unavailable(format!("commit delete: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use threadline_core::message::ToolCall;

    async fn test_store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn create_and_fetch_thread() {
        let store = test_store().await;
        let mut metadata = serde_json::Map::new();
        metadata.insert("source".into(), serde_json::json!("test"));

        let thread = store.create_thread(metadata).await.unwrap();
        let fetched = store.get_thread(&thread.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, thread.id);
        assert_eq!(fetched.metadata["source"], serde_json::json!("test"));
    }

    #[tokio::test]
    async fn append_preserves_caller_order() {
        let store = test_store().await;
        let thread = store.create_thread(serde_json::Map::new()).await.unwrap();

        store
            .append_messages(
                &thread.id,
                &[
                    Message::system("sys"),
                    Message::user("usr"),
                    Message::assistant("asst"),
                ],
            )
            .await
            .unwrap();

        let messages = store.list_messages(&thread.id).await.unwrap();
        let contents: Vec<_> = messages
            .iter()
            .map(|m| m.content.as_deref().unwrap())
            .collect();
        assert_eq!(contents, vec!["sys", "usr", "asst"]);
    }

    #[tokio::test]
    async fn tool_calls_roundtrip_through_storage() {
        let store = test_store().await;
        let thread = store.create_thread(serde_json::Map::new()).await.unwrap();

        let assistant = Message::assistant_with_tools(
            None,
            vec![ToolCall {
                id: "call_1".into(),
                name: "get_weather".into(),
                arguments: r#"{"location":"Tokyo"}"#.into(),
            }],
        );
        let tool = Message::tool_result("call_1", "get_weather", "Sunny, 22°C");
        store
            .append_messages(&thread.id, &[assistant, tool])
            .await
            .unwrap();

        let messages = store.list_messages(&thread.id).await.unwrap();
        assert!(messages[0].content.is_none());
        assert_eq!(messages[0].tool_calls[0].name, "get_weather");
        assert_eq!(messages[1].tool_call_id.as_deref(), Some("call_1"));
    }

    #[tokio::test]
    async fn clear_messages_keeps_thread() {
        let store = test_store().await;
        let thread = store.create_thread(serde_json::Map::new()).await.unwrap();
        store
            .append_messages(&thread.id, &[Message::user("a"), Message::user("b")])
            .await
            .unwrap();

        let deleted = store.clear_messages(&thread.id).await.unwrap();
        assert_eq!(deleted, 2);
        assert!(store.thread_exists(&thread.id).await.unwrap());
        assert!(store.list_messages(&thread.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_thread_removes_everything() {
        let store = test_store().await;
        let thread = store.create_thread(serde_json::Map::new()).await.unwrap();
        store
            .append_messages(&thread.id, &[Message::user("gone")])
            .await
            .unwrap();

        store.delete_thread(&thread.id).await.unwrap();
        assert!(!store.thread_exists(&thread.id).await.unwrap());
    }

    #[tokio::test]
    async fn missing_thread_is_an_error() {
        let store = test_store().await;
        let id = ThreadId::from("missing");
        assert!(matches!(
            store.list_messages(&id).await.unwrap_err(),
            StoreError::ThreadNotFound(_)
        ));
        assert!(matches!(
            store
                .append_messages(&id, &[Message::user("x")])
                .await
                .unwrap_err(),
            StoreError::ThreadNotFound(_)
        ));
    }

    #[tokio::test]
    async fn ensure_thread_accepts_caller_chosen_id() {
        let store = test_store().await;
        let id = ThreadId::from("caller-chosen");
        store.ensure_thread(&id).await.unwrap();
        store.ensure_thread(&id).await.unwrap();
        assert!(store.thread_exists(&id).await.unwrap());
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = format!("sqlite://{}/threads.db", dir.path().display());

        let id = {
            let store = SqliteStore::new(&path).await.unwrap();
            let thread = store.create_thread(serde_json::Map::new()).await.unwrap();
            store
                .append_messages(&thread.id, &[Message::user("durable")])
                .await
                .unwrap();
            thread.id
        };

        let store = SqliteStore::new(&path).await.unwrap();
        let messages = store.list_messages(&id).await.unwrap();
        assert_eq!(messages[0].content.as_deref(), Some("durable"));
    }
}
