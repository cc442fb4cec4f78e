//! In-memory store — useful for testing and ephemeral sessions.

use async_trait::async_trait;
use std::collections::HashMap;
use threadline_core::error::StoreError;
use threadline_core::message::{Message, Thread, ThreadId};
use threadline_core::store::TranscriptStore;
use tokio::sync::RwLock;

struct ThreadLog {
    thread: Thread,
    messages: Vec<Message>,
}

/// An in-memory store that keeps each thread's log in a Vec.
/// Useful for testing and sessions where persistence isn't needed.
pub struct InMemoryStore {
    threads: RwLock<HashMap<String, ThreadLog>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            threads: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TranscriptStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn create_thread(
        &self,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Thread, StoreError> {
        let thread = Thread::new(metadata);
        self.threads.write().await.insert(
            thread.id.0.clone(),
            ThreadLog {
                thread: thread.clone(),
                messages: Vec::new(),
            },
        );
        Ok(thread)
    }

    async fn ensure_thread(&self, id: &ThreadId) -> Result<(), StoreError> {
        let mut threads = self.threads.write().await;
        threads.entry(id.0.clone()).or_insert_with(|| ThreadLog {
            thread: Thread {
                id: id.clone(),
                created_at: chrono::Utc::now(),
                metadata: serde_json::Map::new(),
            },
            messages: Vec::new(),
        });
        Ok(())
    }

    async fn thread_exists(&self, id: &ThreadId) -> Result<bool, StoreError> {
        Ok(self.threads.read().await.contains_key(&id.0))
    }

    async fn get_thread(&self, id: &ThreadId) -> Result<Option<Thread>, StoreError> {
        Ok(self
            .threads
            .read()
            .await
            .get(&id.0)
            .map(|log| log.thread.clone()))
    }

    async fn append_messages(
        &self,
        id: &ThreadId,
        messages: &[Message],
    ) -> Result<(), StoreError> {
        let mut threads = self.threads.write().await;
        let log = threads
            .get_mut(&id.0)
            .ok_or_else(|| StoreError::ThreadNotFound(id.0.clone()))?;
        log.messages.extend_from_slice(messages);
        Ok(())
    }

    async fn list_messages(&self, id: &ThreadId) -> Result<Vec<Message>, StoreError> {
        let threads = self.threads.read().await;
        let log = threads
            .get(&id.0)
            .ok_or_else(|| StoreError::ThreadNotFound(id.0.clone()))?;
        Ok(log.messages.clone())
    }

    async fn clear_messages(&self, id: &ThreadId) -> Result<u64, StoreError> {
        let mut threads = self.threads.write().await;
        let log = threads
            .get_mut(&id.0)
            .ok_or_else(|| StoreError::ThreadNotFound(id.0.clone()))?;
        let count = log.messages.len() as u64;
        log.messages.clear();
        Ok(count)
    }

    async fn delete_thread(&self, id: &ThreadId) -> Result<(), StoreError> {
        self.threads.write().await.remove(&id.0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_then_list_preserves_order() {
        let store = InMemoryStore::new();
        let thread = store.create_thread(serde_json::Map::new()).await.unwrap();

        store
            .append_messages(
                &thread.id,
                &[Message::user("first"), Message::assistant("second")],
            )
            .await
            .unwrap();
        store
            .append_messages(&thread.id, &[Message::user("third")])
            .await
            .unwrap();

        let messages = store.list_messages(&thread.id).await.unwrap();
        let contents: Vec<_> = messages
            .iter()
            .map(|m| m.content.as_deref().unwrap())
            .collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn repeated_reads_are_identical() {
        let store = InMemoryStore::new();
        let thread = store.create_thread(serde_json::Map::new()).await.unwrap();
        store
            .append_messages(&thread.id, &[Message::user("hello")])
            .await
            .unwrap();

        let first = store.list_messages(&thread.id).await.unwrap();
        let second = store.list_messages(&thread.id).await.unwrap();
        assert_eq!(first.len(), second.len());
        assert_eq!(first[0].id, second[0].id);
    }

    #[tokio::test]
    async fn clear_keeps_thread_identity() {
        let store = InMemoryStore::new();
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
    async fn append_to_missing_thread_fails() {
        let store = InMemoryStore::new();
        let err = store
            .append_messages(&ThreadId::from("nope"), &[Message::user("x")])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ThreadNotFound(_)));
    }

    #[tokio::test]
    async fn ensure_thread_is_idempotent() {
        let store = InMemoryStore::new();
        let id = ThreadId::from("fixed-id");
        store.ensure_thread(&id).await.unwrap();
        store
            .append_messages(&id, &[Message::user("kept")])
            .await
            .unwrap();
        store.ensure_thread(&id).await.unwrap();

        assert_eq!(store.list_messages(&id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_thread_cascades() {
        let store = InMemoryStore::new();
        let thread = store.create_thread(serde_json::Map::new()).await.unwrap();
        store
            .append_messages(&thread.id, &[Message::user("gone")])
            .await
            .unwrap();

        store.delete_thread(&thread.id).await.unwrap();
        assert!(!store.thread_exists(&thread.id).await.unwrap());
    }
}
