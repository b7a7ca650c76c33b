use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::credential::guard::mask_key;
use crate::error::{NotifyError, Result};

type Job<R> = Box<dyn FnOnce() -> BoxFuture<'static, Result<R>> + Send>;

struct Entry<R> {
    job: Job<R>,
    reply: oneshot::Sender<Result<R>>,
    enqueued_at: Instant,
}

/// Exists exactly as long as its drain task runs
struct Lane<R> {
    entries: VecDeque<Entry<R>>,
    /// Set while the lane cools down after a successful delivery
    cooldown_until: Option<Instant>,
    /// Cancelled by `clear`; replaced once the drain has observed it
    cancel: CancellationToken,
}

impl<R> Lane<R> {
    fn new() -> Self {
        Lane {
            entries: VecDeque::new(),
            cooldown_until: None,
            cancel: CancellationToken::new(),
        }
    }

    /// True if the lane was cleared since the last call
    fn take_cleared(&mut self) -> bool {
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
            true
        } else {
            false
        }
    }
}

type Registry<R> = HashMap<String, Lane<R>>;

/// Queue depth and cool-down for one key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Entries waiting behind the in-flight delivery
    pub queued_count: usize,
    pub next_available_in_seconds: u64,
}

/// One FIFO lane per key, at most one delivery in flight or cooling down per lane
pub struct DeliveryQueue<R> {
    registry: Arc<Mutex<Registry<R>>>,
    cooldown: Duration,
    handler_timeout: Duration,
}

impl<R: Send + 'static> DeliveryQueue<R> {
    pub fn new(cooldown: Duration, handler_timeout: Duration) -> Self {
        DeliveryQueue {
            registry: Arc::new(Mutex::new(HashMap::new())),
            cooldown,
            handler_timeout,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Queue `job` behind earlier submissions for `key` and wait for its outcome
    ///
    /// Resolves with `QueueCleared` if the lane is cleared before the job runs.
    pub async fn submit<F, Fut>(&self, key: &str, job: F) -> Result<R>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        let (reply, outcome) = oneshot::channel();
        let entry = Entry {
            job: Box::new(move || job().boxed()),
            reply,
            enqueued_at: Instant::now(),
        };

        let spawn_drain = {
            let mut lanes = self.registry.lock().await;
            let mut created = false;
            let lane = lanes.entry(key.to_string()).or_insert_with(|| {
                created = true;
                Lane::new()
            });
            lane.entries.push_back(entry);
            debug!(
                "Queued delivery for {} ({} waiting)",
                mask_key(key),
                lane.entries.len()
            );
            created
        };

        if spawn_drain {
            let drain = Drain {
                registry: self.registry.clone(),
                key: key.to_string(),
                cooldown: self.cooldown,
                handler_timeout: self.handler_timeout,
            };
            tokio::spawn(drain.run());
        }

        outcome.await.unwrap_or(Err(NotifyError::QueueCleared))
    }

    pub async fn stats(&self, key: &str) -> QueueStats {
        let lanes = self.registry.lock().await;
        let Some(lane) = lanes.get(key) else {
            return QueueStats::default();
        };

        let remaining = lane
            .cooldown_until
            .map(|until| until.saturating_duration_since(Instant::now()))
            .unwrap_or_default();

        QueueStats {
            queued_count: lane.entries.len(),
            next_available_in_seconds: ceil_secs(remaining),
        }
    }

    /// Drop every waiting entry for `key` and cancel its cool-down
    ///
    /// A delivery already in flight runs to completion and keeps the lane
    /// until it finishes, so later submissions still wait for it. Returns the
    /// number of entries dropped.
    pub async fn clear(&self, key: &str) -> usize {
        let mut lanes = self.registry.lock().await;
        let Some(lane) = lanes.get_mut(key) else {
            return 0;
        };

        let dropped = lane.entries.len();
        lane.entries.clear();
        lane.cooldown_until = None;
        lane.cancel.cancel();
        info!("Cleared queue for {} ({} dropped)", mask_key(key), dropped);
        dropped
    }

    /// Keys with queued, in-flight or cooling-down deliveries
    pub async fn active_keys(&self) -> Vec<String> {
        let lanes = self.registry.lock().await;
        let mut keys: Vec<String> = lanes.keys().cloned().collect();
        keys.sort();
        keys
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

/// Drain task for one lane; the only place a lane is removed
struct Drain<R> {
    registry: Arc<Mutex<Registry<R>>>,
    key: String,
    cooldown: Duration,
    handler_timeout: Duration,
}

impl<R: Send + 'static> Drain<R> {
    async fn run(self) {
        while let Some(entry) = self.next_entry().await {
            debug!(
                "Delivering for {} after {:?} in queue",
                mask_key(&self.key),
                entry.enqueued_at.elapsed()
            );

            let result = self.execute(entry.job).await;
            let delivered = result.is_ok();

            if entry.reply.send(result).is_err() {
                debug!("Caller for {} went away before delivery finished", mask_key(&self.key));
            }

            if !delivered {
                continue;
            }

            let Some(cancel) = self.arm_cooldown().await else {
                continue;
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Cool-down for {} cancelled", mask_key(&self.key));
                }
                _ = tokio::time::sleep(self.cooldown) => {}
            }
        }
    }

    /// Pop the next entry, or release the lane once it is empty
    async fn next_entry(&self) -> Option<Entry<R>> {
        let mut lanes = self.registry.lock().await;
        let lane = lanes.get_mut(&self.key)?;

        lane.take_cleared();
        lane.cooldown_until = None;
        match lane.entries.pop_front() {
            Some(entry) => Some(entry),
            None => {
                lanes.remove(&self.key);
                None
            }
        }
    }

    async fn execute(&self, job: Job<R>) -> Result<R> {
        let run = AssertUnwindSafe(job()).catch_unwind();

        match tokio::time::timeout(self.handler_timeout, run).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                error!("Delivery handler for {} panicked", mask_key(&self.key));
                Err(NotifyError::transport("queue", "delivery handler panicked"))
            }
            Err(_) => Err(NotifyError::HandlerTimeout(self.handler_timeout.as_secs())),
        }
    }

    /// Start the cool-down and hand back its cancel token
    ///
    /// Returns `None` when the lane was cleared while the delivery ran; the
    /// cleared lane owes no cool-down.
    async fn arm_cooldown(&self) -> Option<CancellationToken> {
        let mut lanes = self.registry.lock().await;
        let lane = lanes.get_mut(&self.key)?;
        if lane.take_cleared() {
            return None;
        }
        lane.cooldown_until = Some(Instant::now() + self.cooldown);
        Some(lane.cancel.clone())
    }
}
