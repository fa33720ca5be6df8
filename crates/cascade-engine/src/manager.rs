//! Registry of streams and steps; tracks idle/active per step; fires
//! quiescence (spec §4.4).

use cascade_core::Message;
use cascade_storage::Storage;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::stream::Stream;
use crate::unroll;

/// The quiescence detector. `completion` doubles as the shutdown signal:
/// once the completion predicate fires the token is cancelled, which both
/// releases [`Manager::wait_for_completion`] and tells every worker
/// listening on the same token to stop (§4.4's design note: mark-idle must
/// happen-before the next receive, with nothing racing in between — a
/// single token makes "detected" and "tear down" the same event).
pub struct Manager {
    storage: Arc<dyn Storage>,
    streams: RwLock<HashMap<String, Arc<Stream>>>,
    registered: RwLock<HashSet<String>>,
    idle: RwLock<HashSet<String>>,
    completion: CancellationToken,
}

impl Manager {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            streams: RwLock::new(HashMap::new()),
            registered: RwLock::new(HashSet::new()),
            idle: RwLock::new(HashSet::new()),
            completion: CancellationToken::new(),
        }
    }

    /// The token that fires at quiescence. Step workers select on this
    /// alongside their own `receive()` to exit cleanly at shutdown.
    pub fn completion_token(&self) -> CancellationToken {
        self.completion.clone()
    }

    /// Idempotent stream construction: returns the existing stream if one
    /// is already registered under `name`.
    pub async fn get_or_create_stream(&self, name: &str) -> Arc<Stream> {
        if let Some(stream) = self.streams.read().await.get(name) {
            return stream.clone();
        }
        let mut streams = self.streams.write().await;
        streams
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Stream::new(name, self.storage.clone())))
            .clone()
    }

    pub async fn stream(&self, name: &str) -> Option<Arc<Stream>> {
        self.streams.read().await.get(name).cloned()
    }

    /// Mark a worker-level id active: removes it from the idle set,
    /// registering it first if this is its first appearance. Evaluates the
    /// completion predicate too (it cannot fire here, since the worker just
    /// left the idle set, but the progress event is reported on every
    /// idle/active transition alike).
    pub async fn mark_step_active(&self, worker_id: &str) {
        self.registered.write().await.insert(worker_id.to_string());
        let removed = self.idle.write().await.remove(worker_id);
        if removed {
            tracing::debug!(worker = worker_id, "marked active");
        }
        self.check_completion().await;
    }

    /// Mark a worker-level id idle, registering it if new, then evaluates
    /// the completion predicate.
    pub async fn mark_step_idle(&self, worker_id: &str) {
        self.registered.write().await.insert(worker_id.to_string());
        self.idle.write().await.insert(worker_id.to_string());
        tracing::debug!(worker = worker_id, "marked idle");
        self.check_completion().await;
    }

    async fn check_completion(&self) {
        let registered = self.registered.read().await;
        let idle = self.idle.read().await;
        let all_idle = idle.len() == registered.len();

        let streams = self.streams.read().await;
        let mut all_empty = true;
        let mut active_streams = 0usize;
        for stream in streams.values() {
            if !stream.is_empty().await {
                all_empty = false;
                active_streams += 1;
            }
        }

        tracing::info!(
            idle = idle.len(),
            registered = registered.len(),
            active_streams,
            "quiescence check"
        );

        if all_idle && all_empty {
            tracing::info!("pipeline quiescent");
            self.completion.cancel();
        }
    }

    /// Block until the completion predicate has fired.
    pub async fn wait_for_completion(&self) {
        self.completion.cancelled().await;
    }

    /// Rehydrate every stream's subscriber queues from storage on startup,
    /// replaying each persisted message with `persist=false` (spec §4.4,
    /// §4.7 step 1). Subscriptions must already be registered (steps are
    /// set up before `run()` is called) so replay reaches the right queues.
    pub async fn restore_state(&self) -> Result<()> {
        for name in self.storage.list_streams().await? {
            let stream = self.get_or_create_stream(&name).await;
            for message in self.storage.list_messages(&name).await? {
                stream.publish(message, false).await?;
            }
        }
        Ok(())
    }

    /// Reconstruct every ancestral payload of `message` by walking its
    /// cascade id (spec §4.6).
    pub async fn unroll(&self, message: &Message) -> Result<serde_json::Map<String, serde_json::Value>> {
        unroll::unroll(self.storage.as_ref(), message).await
    }
}
