//! The [`Storage`] contract: a durable map from `(stream, cascade_id)` to
//! message, safe under many concurrent callers (spec §4.2).
//!
//! Implementations must serialise writes and allow concurrent reads. A
//! single writer mutex (or, for SQLite, a connection pool that serialises at
//! the database level) with per-connection read handles is sufficient.

use async_trait::async_trait;
use cascade_core::Message;

use crate::error::Result;

/// Durable, content-addressed message storage.
///
/// Every method may fail with [`crate::StorageError::Backend`] on backend
/// faults; callers propagate rather than retry silently, except at the
/// step-worker boundary where a storage fault on one message is logged and
/// the worker moves on to the next (spec §7).
#[async_trait]
pub trait Storage: Send + Sync {
    /// Point existence test for `(stream, cascade_id)`.
    async fn exists(&self, stream: &str, cascade_id: &str) -> Result<bool>;

    /// Insert a message. Fails with [`crate::StorageError::AlreadyExists`]
    /// if the key is already present — callers must `exists`-check first.
    async fn store(&self, stream: &str, message: &Message) -> Result<()>;

    /// Stream-agnostic point lookup by cascade id, used by unroll.
    async fn get(&self, cascade_id: &str) -> Result<Option<Message>>;

    /// All messages in a stream, in ascending `created_at` (insertion) order.
    async fn list_messages(&self, stream: &str) -> Result<Vec<Message>>;

    /// Distinct stream names with at least one persisted message.
    async fn list_streams(&self) -> Result<Vec<String>>;
}
