//! Request orchestration
//!
//! `validate → admit → (queue → primary | fallback)`. The queue job owns the
//! primary counter reservation: it increments optimistically, and gives the
//! slot back when the send fails, when the job is abandoned by the queue's
//! handler timeout, or when another request already took the last slot (in
//! which case the message goes to the fallback channels).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{Config, StorageBackend};
use crate::counter::{
    CounterSnapshot, CounterStore, DailyCounter, MemoryCounterStore, SqliteCounterStore,
    EMAIL_COUNTER, PRIMARY_COUNTER, REGISTRATION_COUNTER,
};
use crate::credential::guard::mask_key;
use crate::credential::{
    CredentialGuard, CredentialRecord, CredentialStore, MemoryCredentialStore,
    SqliteCredentialStore,
};
use crate::error::{NotifyError, Result};
use crate::fallback::{DeliveryChannel, FallbackDelivery, FallbackDispatcher};
use crate::gate::{AdmissionDecision, AdmissionGate, FailurePolicy};
use crate::queue::{DeliveryQueue, QueueStats};
use crate::transport::{
    BrevoEmailTransport, ChatClassifier, ContentClassifier, EmailTransport, PrimaryTransport,
    PushRelayTransport, PushTransport, SendReceipt, SmsGateTransport,
};
use crate::utils::{normalize_ph_number, validate_message, Clock, SystemClock};

/// Message submitted by a client
#[derive(Debug, Clone, Deserialize)]
pub struct SendRequest {
    pub recipient: String,
    pub message: String,
}

/// Per-key daily usage after a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageInfo {
    pub sent: u32,
    pub limit: u32,
    pub remaining: u32,
}

/// How a message was delivered
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Delivery {
    pub delivery_method: DeliveryChannel,
    /// Normalized phone number the message was addressed to
    pub recipient: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<SendReceipt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackDelivery>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageInfo>,
}

impl Delivery {
    fn from_fallback(recipient: String, fallback: FallbackDelivery) -> Self {
        Delivery {
            delivery_method: fallback.channel,
            recipient,
            receipt: None,
            fallback: Some(fallback),
            usage: None,
        }
    }
}

/// Queue state reported with each send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueInfo {
    pub queued_messages: usize,
    pub next_available_in_seconds: u64,
    /// Rough time until every queued message has been sent
    pub estimated_completion_seconds: u64,
}

/// Response to a successful send
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendOutcome {
    #[serde(flatten)]
    pub delivery: Delivery,
    pub queue: QueueInfo,
}

/// Per-key view returned by the queue status endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStatus {
    pub queue: QueueInfo,
    pub last_request: Option<DateTime<Utc>>,
    pub daily_usage: u32,
    pub daily_limit: u32,
    pub daily_remaining: u32,
    pub global: CounterSnapshot,
    pub timestamp: DateTime<Utc>,
}

/// Backends the service is assembled from
pub struct Backends {
    pub counters: Arc<dyn CounterStore>,
    pub credentials: Arc<dyn CredentialStore>,
    pub primary: Arc<dyn PrimaryTransport>,
    pub email: Arc<dyn EmailTransport>,
    pub push: Arc<dyn PushTransport>,
    pub classifier: Arc<dyn ContentClassifier>,
    pub clock: Arc<dyn Clock>,
}

impl Backends {
    /// Stores and HTTP transports described by `config`
    pub async fn from_config(config: &Config) -> Result<Self> {
        let (counters, credentials): (Arc<dyn CounterStore>, Arc<dyn CredentialStore>) =
            match config.storage.backend {
                StorageBackend::Memory => {
                    info!("Using in-memory storage; counters reset on restart");
                    (
                        Arc::new(MemoryCounterStore::new()),
                        Arc::new(MemoryCredentialStore::new()),
                    )
                }
                StorageBackend::Sqlite => {
                    info!("Connecting to {}", config.storage.database_url);
                    let pool = SqlitePoolOptions::new()
                        .max_connections(5)
                        .connect(&config.storage.database_url)
                        .await?;

                    let counters = SqliteCounterStore::new(pool.clone());
                    counters.init_db().await?;
                    let credentials = SqliteCredentialStore::new(pool);
                    credentials.init_db().await?;

                    (Arc::new(counters), Arc::new(credentials))
                }
            };

        Ok(Backends {
            counters,
            credentials,
            primary: Arc::new(SmsGateTransport::from_config(&config.sms_gateway)?),
            email: Arc::new(BrevoEmailTransport::from_config(&config.email)?),
            push: Arc::new(PushRelayTransport::from_config(&config.push)?),
            classifier: Arc::new(ChatClassifier::from_config(&config.classifier)?),
            clock: Arc::new(SystemClock),
        })
    }
}

/// Text sent over the primary channel
pub fn frame_primary(project_name: &str, message: &str, signature: &str) -> String {
    format!("From: {}\n\n{}\n\n{}", project_name, message, signature)
}

pub struct NotificationService {
    gate: AdmissionGate,
    guard: CredentialGuard,
    queue: DeliveryQueue<Delivery>,
    primary_counter: DailyCounter,
    registration_counter: DailyCounter,
    fallback: Arc<FallbackDispatcher>,
    primary: Arc<dyn PrimaryTransport>,
    clock: Arc<dyn Clock>,
    signature: String,
    counter_policy: FailurePolicy,
}

impl NotificationService {
    pub fn new(config: &Config, backends: Backends) -> Self {
        let limits = &config.limits;

        let guard = CredentialGuard::new(
            backends.credentials,
            backends.clock.clone(),
            limits.ban_threshold,
        );
        let primary_counter = DailyCounter::new(
            PRIMARY_COUNTER,
            limits.primary_daily,
            backends.counters.clone(),
            backends.clock.clone(),
        );
        let email_counter = DailyCounter::new(
            EMAIL_COUNTER,
            limits.email_daily,
            backends.counters.clone(),
            backends.clock.clone(),
        );
        let registration_counter = DailyCounter::new(
            REGISTRATION_COUNTER,
            limits.registration_daily,
            backends.counters,
            backends.clock.clone(),
        );

        let gate = AdmissionGate::new(
            guard.clone(),
            backends.classifier,
            primary_counter.clone(),
            backends.clock.clone(),
            limits.per_key_daily,
            limits.request_interval(),
            config.policy.clone(),
        );

        let fallback = FallbackDispatcher::new(
            backends.email,
            backends.push,
            email_counter,
            backends.clock.clone(),
            config.push.click_url.clone(),
        );

        NotificationService {
            gate,
            guard,
            queue: DeliveryQueue::new(limits.delivery_cooldown(), limits.handler_timeout()),
            primary_counter,
            registration_counter,
            fallback: Arc::new(fallback),
            primary: backends.primary,
            clock: backends.clock,
            signature: config.sms_gateway.signature.clone(),
            counter_policy: config.policy.counter_on_error,
        }
    }

    /// Validate, admit and deliver one message
    pub async fn send(&self, api_key: &str, request: SendRequest) -> Result<SendOutcome> {
        let recipient = normalize_ph_number(&request.recipient)?;
        validate_message(&request.message)?;

        let delivery = match self.gate.evaluate(api_key, &request.message).await? {
            AdmissionDecision::Fallback(record) => {
                let fallback = self
                    .fallback
                    .dispatch(&record, &recipient, &request.message)
                    .await?;
                Delivery::from_fallback(recipient, fallback)
            }
            AdmissionDecision::Primary(record) => {
                let job = PrimaryJob {
                    record,
                    recipient,
                    message: request.message,
                    signature: self.signature.clone(),
                    per_key_daily: self.gate.per_key_daily(),
                    counter: self.primary_counter.clone(),
                    counter_policy: self.counter_policy,
                    guard: self.guard.clone(),
                    primary: self.primary.clone(),
                    fallback: self.fallback.clone(),
                };
                self.queue.submit(api_key, move || job.run()).await?
            }
        };

        Ok(SendOutcome {
            delivery,
            queue: self.queue_info(api_key).await,
        })
    }

    pub fn per_key_daily(&self) -> u32 {
        self.gate.per_key_daily()
    }

    async fn queue_info(&self, api_key: &str) -> QueueInfo {
        let QueueStats {
            queued_count,
            next_available_in_seconds,
        } = self.queue.stats(api_key).await;

        QueueInfo {
            queued_messages: queued_count,
            next_available_in_seconds,
            estimated_completion_seconds: queued_count as u64 * self.queue.cooldown().as_secs(),
        }
    }

    /// Queue and quota view for one key
    pub async fn queue_status(&self, api_key: &str) -> Result<QueueStatus> {
        let record = self.guard.lookup(api_key).await?;
        self.guard.check_standing(&record)?;

        let daily_usage = self.guard.usage_today(&record);
        let daily_limit = self.gate.per_key_daily();

        Ok(QueueStatus {
            queue: self.queue_info(api_key).await,
            last_request: record.last_request_at,
            daily_usage,
            daily_limit,
            daily_remaining: daily_limit.saturating_sub(daily_usage),
            global: self.primary_counter.snapshot().await?,
            timestamp: self.clock.now(),
        })
    }

    /// Register a new credential, within the daily registration cap
    ///
    /// A registration that fails after taking a slot gives the slot back.
    pub async fn issue_credential(
        &self,
        phone_number: &str,
        email: Option<&str>,
        project_name: &str,
    ) -> Result<CredentialRecord> {
        let counted = self.reserve_registration().await?;

        let issued = self.guard.issue(phone_number, email, project_name).await;
        if issued.is_err() && counted {
            self.release_registration().await;
        }
        issued
    }

    /// Take one registration slot; false when the counter could not be reached
    async fn reserve_registration(&self) -> Result<bool> {
        let counter = &self.registration_counter;
        match counter.increment().await {
            Ok(count) if count > counter.limit() => {
                self.release_registration().await;
                warn!("Daily registration limit of {} reached", counter.limit());
                Err(NotifyError::RegistrationLimitReached {
                    limit: counter.limit(),
                    reset_date: self.clock.now().date_naive(),
                })
            }
            Ok(count) => {
                info!(
                    "Registration slot taken ({}/{} today)",
                    count,
                    counter.limit()
                );
                Ok(true)
            }
            Err(e) => match self.counter_policy {
                FailurePolicy::Allow => {
                    warn!("Registration counter unavailable, allowing: {}", e);
                    Ok(false)
                }
                FailurePolicy::Deny => Err(e),
            },
        }
    }

    async fn release_registration(&self) {
        if let Err(e) = self.registration_counter.decrement().await {
            warn!("Failed to roll back registration counter: {}", e);
        }
    }

    /// Snapshots of the primary, email and registration counters
    pub async fn counters(&self) -> Result<Vec<CounterSnapshot>> {
        Ok(vec![
            self.primary_counter.snapshot().await?,
            self.fallback.email_counter().snapshot().await?,
            self.registration_counter.snapshot().await?,
        ])
    }

    pub async fn clear_queue(&self, api_key: &str) -> usize {
        self.queue.clear(api_key).await
    }

    /// Keys with pending deliveries and their queue state
    pub async fn active_queues(&self) -> Vec<(String, QueueStats)> {
        let mut queues = Vec::new();
        for key in self.queue.active_keys().await {
            let stats = self.queue.stats(&key).await;
            queues.push((key, stats));
        }
        queues
    }
}

/// One primary-channel delivery, run inside the key's queue lane
struct PrimaryJob {
    record: CredentialRecord,
    recipient: String,
    message: String,
    signature: String,
    per_key_daily: u32,
    counter: DailyCounter,
    counter_policy: FailurePolicy,
    guard: CredentialGuard,
    primary: Arc<dyn PrimaryTransport>,
    fallback: Arc<FallbackDispatcher>,
}

impl PrimaryJob {
    async fn run(self) -> Result<Delivery> {
        let reservation = match self.counter.increment().await {
            Ok(count) if count > self.counter.limit() => {
                Reservation::new(self.counter.clone()).release().await;
                info!("Primary capacity taken while queued, using fallback");
                let fallback = self
                    .fallback
                    .dispatch(&self.record, &self.recipient, &self.message)
                    .await?;
                return Ok(Delivery::from_fallback(self.recipient, fallback));
            }
            Ok(_) => Some(Reservation::new(self.counter.clone())),
            Err(e) => match self.counter_policy {
                FailurePolicy::Allow => {
                    warn!("Primary counter unavailable, sending uncounted: {}", e);
                    None
                }
                FailurePolicy::Deny => return Err(e),
            },
        };

        let text = frame_primary(&self.record.project_name, &self.message, &self.signature);
        let receipt = match self.primary.send(&self.recipient, &text).await {
            Ok(receipt) => {
                if let Some(reservation) = reservation {
                    reservation.keep();
                }
                receipt
            }
            Err(e) => {
                if let Some(reservation) = reservation {
                    reservation.release().await;
                }
                warn!(
                    "Primary delivery failed for {}: {}",
                    mask_key(&self.record.api_key),
                    e
                );
                return Err(e);
            }
        };

        let sent = match self.guard.record_usage(&self.record.api_key).await {
            Ok(sent) => sent,
            Err(e) => {
                warn!("Failed to record usage: {}", e);
                self.guard.usage_today(&self.record).saturating_add(1)
            }
        };

        info!(
            "Delivered to {} for {} ({}/{} today)",
            self.recipient,
            mask_key(&self.record.api_key),
            sent,
            self.per_key_daily
        );

        Ok(Delivery {
            delivery_method: DeliveryChannel::Primary,
            recipient: self.recipient,
            receipt: Some(receipt),
            fallback: None,
            usage: Some(UsageInfo {
                sent,
                limit: self.per_key_daily,
                remaining: self.per_key_daily.saturating_sub(sent),
            }),
        })
    }
}

/// A slot taken on the primary counter
///
/// Unless kept, the slot is given back. When the job is dropped mid-send
/// (handler timeout or panic) the decrement runs on a spawned task.
struct Reservation {
    counter: Option<DailyCounter>,
}

impl Reservation {
    fn new(counter: DailyCounter) -> Self {
        Reservation {
            counter: Some(counter),
        }
    }

    fn keep(mut self) {
        self.counter = None;
    }

    async fn release(mut self) {
        if let Some(counter) = self.counter.take() {
            rollback(counter).await;
        }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        let Some(counter) = self.counter.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Primary delivery abandoned, releasing its counter slot");
                handle.spawn(rollback(counter));
            }
            Err(_) => warn!("No runtime to release primary counter slot"),
        }
    }
}

async fn rollback(counter: DailyCounter) {
    if let Err(e) = counter.decrement().await {
        warn!("Failed to roll back primary counter: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_primary() {
        assert_eq!(
            frame_primary("Shop", "Order ready", "Sent via SMS API Philippines"),
            "From: Shop\n\nOrder ready\n\nSent via SMS API Philippines"
        );
    }
}
