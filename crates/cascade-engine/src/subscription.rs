//! Per-consumer bounded mailbox fed by a [`crate::stream::Stream`].

use cascade_core::Message;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Default bound on a subscription's mailbox. Publishing blocks once a
/// subscriber's queue is at this depth (spec §5 backpressure).
pub const DEFAULT_CAPACITY: usize = 256;

/// One consumer's mailbox. Created at setup, never destroyed, never
/// rewired (spec §3). Cheaply `Clone`-able so a transform's parallel
/// workers can share the single input subscription declared by their port.
#[derive(Clone)]
pub struct Subscription {
    id: String,
    receiver: Arc<Mutex<mpsc::Receiver<Message>>>,
}

impl Subscription {
    pub(crate) fn new(id: String, receiver: mpsc::Receiver<Message>) -> Self {
        Self { id, receiver: Arc::new(Mutex::new(receiver)) }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Block until the next message arrives, then remove and return it.
    /// Returns `None` only once every sender has been dropped (engine
    /// shutdown), which callers treat the same as a cancellation signal.
    pub async fn receive(&self) -> Option<Message> {
        let mut guard = self.receiver.lock().await;
        guard.recv().await
    }

    /// True iff the mailbox currently holds no messages.
    pub async fn is_empty(&self) -> bool {
        let guard = self.receiver.lock().await;
        guard.is_empty()
    }

    pub(crate) fn receiver_handle(&self) -> Arc<Mutex<mpsc::Receiver<Message>>> {
        self.receiver.clone()
    }
}
