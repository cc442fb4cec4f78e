//! TranscriptStore trait — the abstraction over durable message logs.
//!
//! A transcript store is pure CRUD over a keyed, append-only log: it owns no
//! protocol logic. The whole value proposition of the relay is that callers
//! never resend history, so reads must return exactly what was appended, in
//! the order it was appended.

use crate::error::StoreError;
use crate::message::{Message, Thread, ThreadId};
use async_trait::async_trait;

/// Durable, ordered, per-thread message storage.
///
/// Implementations must guarantee:
/// - `append_messages` is atomic per call (all-or-nothing) and preserves the
///   caller-supplied order.
/// - `list_messages` returns messages in insertion order, never re-sorted by
///   any other key, with no implicit trimming.
/// - Unavailability surfaces as `StoreError` — it is never silently
///   swallowed, because a lost write would desynchronize the client's view
///   from durable history.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// A human-readable name for this backend (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Create a new thread with a fresh id.
    async fn create_thread(
        &self,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> std::result::Result<Thread, StoreError>;

    /// Create the thread row for a caller-chosen id if it does not exist yet.
    async fn ensure_thread(&self, id: &ThreadId) -> std::result::Result<(), StoreError>;

    /// Whether a thread exists.
    async fn thread_exists(&self, id: &ThreadId) -> std::result::Result<bool, StoreError>;

    /// Fetch a thread's identity and metadata.
    async fn get_thread(&self, id: &ThreadId)
    -> std::result::Result<Option<Thread>, StoreError>;

    /// Append a batch of messages atomically, preserving the given order.
    async fn append_messages(
        &self,
        id: &ThreadId,
        messages: &[Message],
    ) -> std::result::Result<(), StoreError>;

    /// All messages of a thread, in insertion order.
    async fn list_messages(&self, id: &ThreadId)
    -> std::result::Result<Vec<Message>, StoreError>;

    /// Delete all messages of a thread, keeping the thread identity.
    /// Returns the number of deleted messages.
    async fn clear_messages(&self, id: &ThreadId) -> std::result::Result<u64, StoreError>;

    /// Delete a thread and all its messages.
    async fn delete_thread(&self, id: &ThreadId) -> std::result::Result<(), StoreError>;
}
