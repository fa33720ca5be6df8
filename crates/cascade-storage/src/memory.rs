//! In-memory [`Storage`] backend for tests and embedding without a filesystem.
//!
//! Grounded on `langgraph-checkpoint`'s `InMemoryCheckpointSaver`: a single
//! `RwLock`-guarded map, no external dependencies, data lost on drop.

use async_trait::async_trait;
use cascade_core::Message;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use crate::error::{Result, StorageError};
use crate::traits::Storage;

#[derive(Default)]
struct Inner {
    /// Per-stream insertion-ordered message log.
    by_stream: HashMap<String, Vec<Message>>,
    /// `(stream, cascade_id)` keys present, for O(1) existence checks.
    keys: HashSet<(String, String)>,
    /// Stream-agnostic lookup by cascade id, used by unroll.
    by_id: HashMap<String, Message>,
}

/// Thread-safe in-memory [`Storage`] implementation.
#[derive(Default)]
pub struct InMemoryStorage {
    inner: RwLock<Inner>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn exists(&self, stream: &str, cascade_id: &str) -> Result<bool> {
        let inner = self.inner.read().await;
        Ok(inner.keys.contains(&(stream.to_string(), cascade_id.to_string())))
    }

    async fn store(&self, stream: &str, message: &Message) -> Result<()> {
        let mut inner = self.inner.write().await;
        let key = (stream.to_string(), message.cascade_id.clone());
        if inner.keys.contains(&key) {
            return Err(StorageError::AlreadyExists {
                stream: stream.to_string(),
                cascade_id: message.cascade_id.clone(),
            });
        }
        inner.keys.insert(key);
        inner.by_stream.entry(stream.to_string()).or_default().push(message.clone());
        inner.by_id.insert(message.cascade_id.clone(), message.clone());
        Ok(())
    }

    async fn get(&self, cascade_id: &str) -> Result<Option<Message>> {
        let inner = self.inner.read().await;
        Ok(inner.by_id.get(cascade_id).cloned())
    }

    async fn list_messages(&self, stream: &str) -> Result<Vec<Message>> {
        let inner = self.inner.read().await;
        Ok(inner.by_stream.get(stream).cloned().unwrap_or_default())
    }

    async fn list_streams(&self) -> Result<Vec<String>> {
        let inner = self.inner.read().await;
        Ok(inner.by_stream.keys().cloned().collect())
    }
}
