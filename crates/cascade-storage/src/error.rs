//! Storage error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors raised by the [`crate::Storage`] contract.
#[derive(Error, Debug)]
pub enum StorageError {
    /// A `store` call targeted a `(stream, cascade_id)` pair that already
    /// exists. Per spec §7 this indicates a caller bug — steps are required
    /// to `exists`-check before publishing.
    #[error("message already exists in stream '{stream}': {cascade_id}")]
    AlreadyExists { stream: String, cascade_id: String },

    /// Payload or metadata failed to (de)serialise as JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backing store faulted (I/O, constraint violation, connection loss).
    #[error("storage backend error: {0}")]
    Backend(#[from] sqlx::Error),
}
