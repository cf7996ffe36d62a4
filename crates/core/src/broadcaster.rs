// crates/core/src/broadcaster.rs
//! In-memory fan-out of status updates to live subscribers.
//!
//! Each subscriber owns a bounded channel. `publish` offers the update to every
//! channel with `try_send`; a full channel misses the event (drop-on-full) and
//! its per-subscriber drop counter is bumped so the consumer can reconcile from
//! the update log. Nothing here is persisted, and history is never replayed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use metrics::counter;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tracing::{debug, trace};

use crate::types::StatusUpdate;

/// Default number of undelivered updates a subscriber may buffer.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

/// Identifies one subscription inside a job's subscriber set.
pub type SubscriberId = u64;

/// Broadcaster tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastConfig {
    /// Bound of each subscriber channel. Once a subscriber has this many
    /// undelivered updates, further publishes are dropped for it.
    pub subscriber_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
        }
    }
}

/// What a single `publish` call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers whose channel accepted the update.
    pub delivered: usize,
    /// Subscribers whose channel was full.
    pub dropped: usize,
}

#[derive(Debug)]
struct Subscriber {
    id: SubscriberId,
    tx: mpsc::Sender<StatusUpdate>,
    dropped: Arc<AtomicU64>,
}

#[derive(Debug, Default)]
struct Registry {
    next_id: SubscriberId,
    jobs: HashMap<String, Vec<Subscriber>>,
}

#[derive(Debug)]
struct Inner {
    config: BroadcastConfig,
    registry: Mutex<Registry>,
}

/// Job-id → subscriber-set registry.
///
/// Cheap to clone; all clones share the same registry. One instance is built
/// at startup and handed to everything that publishes or subscribes.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    inner: Arc<Inner>,
}

impl Broadcaster {
    pub fn new(config: BroadcastConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                registry: Mutex::new(Registry::default()),
            }),
        }
    }

    pub fn config(&self) -> BroadcastConfig {
        self.inner.config
    }

    /// Register a new channel for `job_id`.
    ///
    /// The channel only sees updates published after this call returns.
    pub fn subscribe(&self, job_id: &str) -> Subscription {
        let (tx, rx) = mpsc::channel(self.inner.config.subscriber_capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));

        let (id, subscribers) = {
            let mut registry = self.registry();
            registry.next_id += 1;
            let id = registry.next_id;
            let set = registry.jobs.entry(job_id.to_string()).or_default();
            set.push(Subscriber {
                id,
                tx,
                dropped: Arc::clone(&dropped),
            });
            (id, set.len())
        };
        debug!(job_id, subscriber_id = id, subscribers, "subscribed");

        Subscription {
            job_id: job_id.to_string(),
            id,
            rx,
            dropped,
            broadcaster: Some(self.clone()),
        }
    }

    /// Remove a subscriber. Returns `false` when it was not registered, which
    /// covers double unsubscription.
    ///
    /// A job whose subscriber set becomes empty is removed from the registry.
    pub fn unsubscribe(&self, job_id: &str, subscriber_id: SubscriberId) -> bool {
        let mut registry = self.registry();
        let Some(set) = registry.jobs.get_mut(job_id) else {
            return false;
        };
        let before = set.len();
        set.retain(|s| s.id != subscriber_id);
        let removed = set.len() != before;
        let remaining = set.len();
        if remaining == 0 {
            registry.jobs.remove(job_id);
        }
        drop(registry);

        if removed {
            debug!(job_id, subscriber_id, remaining, "unsubscribed");
        }
        removed
    }

    /// Offer `update` to every current subscriber of `job_id`.
    ///
    /// Never blocks and never fails. The registry lock is held for the offer
    /// loop so one subscriber sees updates in the order `publish` was called;
    /// `try_send` does not wait on consumers.
    pub fn publish(&self, job_id: &str, update: &StatusUpdate) -> PublishReport {
        let mut report = PublishReport::default();
        let mut registry = self.registry();
        let Some(set) = registry.jobs.get_mut(job_id) else {
            trace!(job_id, update_id = update.id, "no subscribers");
            return report;
        };

        set.retain(|subscriber| match subscriber.tx.try_send(update.clone()) {
            Ok(()) => {
                report.delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                report.dropped += 1;
                subscriber.dropped.fetch_add(1, Ordering::Relaxed);
                counter!("status_subscriber_dropped_total").increment(1);
                debug!(
                    job_id,
                    subscriber_id = subscriber.id,
                    update_id = update.id,
                    "subscriber channel full, update dropped"
                );
                true
            }
            // Receiver is gone without unsubscribing; prune it.
            Err(TrySendError::Closed(_)) => false,
        });
        if set.is_empty() {
            registry.jobs.remove(job_id);
        }

        trace!(
            job_id,
            update_id = update.id,
            delivered = report.delivered,
            dropped = report.dropped,
            "published"
        );
        report
    }

    /// Number of live subscribers for `job_id`.
    pub fn subscriber_count(&self, job_id: &str) -> usize {
        self.registry().jobs.get(job_id).map_or(0, Vec::len)
    }

    /// Number of jobs with at least one subscriber.
    pub fn job_count(&self) -> usize {
        self.registry().jobs.len()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner.registry.lock().unwrap_or_else(|e| {
            tracing::error!("Mutex poisoned in broadcaster registry; recovering");
            PoisonError::into_inner(e)
        })
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(BroadcastConfig::default())
    }
}

/// Receiving end of one registration.
///
/// Dropping the subscription unsubscribes it, so every exit path of the owner
/// releases its registry slot. `release` does the same eagerly and is a no-op
/// the second time.
#[derive(Debug)]
pub struct Subscription {
    job_id: String,
    id: SubscriberId,
    rx: mpsc::Receiver<StatusUpdate>,
    dropped: Arc<AtomicU64>,
    broadcaster: Option<Broadcaster>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Wait for the next update. `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<StatusUpdate> {
        self.rx.recv().await
    }

    /// Next buffered update without waiting.
    pub fn try_recv(&mut self) -> Option<StatusUpdate> {
        match self.rx.try_recv() {
            Ok(update) => Some(update),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Updates this subscriber missed because its channel was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// True while still registered with the broadcaster.
    pub fn is_registered(&self) -> bool {
        self.broadcaster.is_some()
    }

    /// Unsubscribe now. Returns `true` only on the call that actually
    /// released the registration.
    pub fn release(&mut self) -> bool {
        match self.broadcaster.take() {
            Some(broadcaster) => {
                broadcaster.unsubscribe(&self.job_id, self.id);
                self.rx.close();
                true
            }
            None => false,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}
