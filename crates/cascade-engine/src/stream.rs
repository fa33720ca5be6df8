//! Named channel: accepts publishes, persists them, fans out to
//! subscriptions by weight (spec §4.3).

use cascade_core::Message;
use cascade_storage::Storage;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

use crate::error::Result;
use crate::subscription::{Subscription, DEFAULT_CAPACITY};

struct SubscriptionRecord {
    id: String,
    sender: mpsc::Sender<Message>,
    subscription: Subscription,
    weight: u32,
}

/// A named, persistent fan-out channel. Its observable content is the set
/// of `(cascade_id, payload, metadata)` rows persisted under its name.
pub struct Stream {
    name: String,
    storage: Arc<dyn Storage>,
    subs: RwLock<Vec<SubscriptionRecord>>,
}

impl Stream {
    pub(crate) fn new(name: impl Into<String>, storage: Arc<dyn Storage>) -> Self {
        Self { name: name.into(), storage, subs: RwLock::new(Vec::new()) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a new subscription with the given routing weight. Allowed
    /// only before the engine begins running (spec §3 invariant 3); nothing
    /// in this type enforces that beyond convention, matching the Python
    /// original.
    ///
    /// The mailbox is sized to `DEFAULT_CAPACITY` plus however many messages
    /// are already persisted under this stream's name, so that `restore_state`
    /// replaying the full backlog into a freshly-registered subscription
    /// before any consumer is draining it can never block forever on a full
    /// channel (spec §8 property 4 / scenario S2).
    pub async fn register_subscription(&self, weight: u32) -> Result<(String, Subscription)> {
        let backlog = self.storage.list_messages(&self.name).await?.len();
        let capacity = DEFAULT_CAPACITY.saturating_add(backlog);

        let mut subs = self.subs.write().await;
        let id = format!("{}:sub{}", self.name, subs.len());
        let (tx, rx) = mpsc::channel(capacity);
        let subscription = Subscription::new(id.clone(), rx);
        subs.push(SubscriptionRecord {
            id: id.clone(),
            sender: tx,
            subscription: subscription.clone(),
            weight,
        });
        Ok((id, subscription))
    }

    /// Point existence check against storage, used by steps to avoid
    /// re-deriving a cascade id they have already produced.
    pub async fn check_exists(&self, cascade_id: &str) -> Result<bool> {
        Ok(self.storage.exists(&self.name, cascade_id).await?)
    }

    /// Persist (unless `persist` is false, used only by restore) and fan
    /// out a message to every registered subscription per spec §4.3:
    /// every weight-0 subscription receives it (broadcast), and exactly one
    /// non-zero-weight subscription is chosen by `hash(cascade_id) mod N`
    /// over the weight-expanded subscriber list.
    pub async fn publish(&self, message: Message, persist: bool) -> Result<()> {
        if persist {
            self.storage.store(&self.name, &message).await?;
        }
        tracing::debug!(stream = %self.name, cascade_id = %message.cascade_id, persist, "publish");

        let subs = self.subs.read().await;
        if subs.is_empty() {
            return Ok(());
        }

        let mut weighted: Vec<usize> = Vec::new();
        for (idx, rec) in subs.iter().enumerate() {
            if rec.weight == 0 {
                let _ = rec.sender.send(message.clone()).await;
            } else {
                weighted.extend(std::iter::repeat(idx).take(rec.weight as usize));
            }
        }

        if !weighted.is_empty() {
            let mut hasher = DefaultHasher::new();
            message.cascade_id.hash(&mut hasher);
            let pick = weighted[(hasher.finish() as usize) % weighted.len()];
            tracing::debug!(
                stream = %self.name,
                cascade_id = %message.cascade_id,
                routed_to = %subs[pick].id,
                "weighted route"
            );
            let _ = subs[pick].sender.send(message).await;
        }

        Ok(())
    }

    /// True iff every subscription's mailbox is empty at this instant
    /// (spec §4.3).
    pub async fn is_empty(&self) -> bool {
        let subs = self.subs.read().await;
        for rec in subs.iter() {
            if !rec.subscription.is_empty().await {
                return false;
            }
        }
        true
    }

    pub async fn subscription_count(&self) -> usize {
        self.subs.read().await.len()
    }
}
