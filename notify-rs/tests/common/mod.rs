//! Shared fixtures: in-memory stores, a manual clock and recording transports

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use notify_rs::config::{Config, StorageBackend};
use notify_rs::counter::{
    CounterRecord, CounterStore, DailyCounter, MemoryCounterStore, EMAIL_COUNTER,
    PRIMARY_COUNTER, REGISTRATION_COUNTER,
};
use notify_rs::credential::{CredentialGuard, CredentialRecord, MemoryCredentialStore};
use notify_rs::error::{NotifyError, Result};
use notify_rs::service::{Backends, NotificationService};
use notify_rs::transport::{
    ContentClassifier, EmailContext, EmailTransport, PrimaryTransport, PushData, PushOutcome,
    PushTransport, SendReceipt, Verdict,
};
use notify_rs::utils::{Clock, ManualClock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Records every SMS; fails or stalls on demand
#[derive(Default)]
pub struct FakeSms {
    pub sent: Mutex<Vec<(String, String, Instant)>>,
    pub fail: AtomicBool,
    pub delay: Mutex<Option<Duration>>,
}

impl FakeSms {
    pub fn texts(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(_, t, _)| t.clone()).collect()
    }

    pub fn times(&self) -> Vec<Instant> {
        self.sent.lock().unwrap().iter().map(|(_, _, at)| *at).collect()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl PrimaryTransport for FakeSms {
    async fn send(&self, recipient: &str, text: &str) -> Result<SendReceipt> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError::Transport {
                channel: "sms",
                message: "gateway returned 502".to_string(),
            });
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push((recipient.to_string(), text.to_string(), Instant::now()));
        Ok(SendReceipt {
            provider_id: Some(format!("sms-{}", sent.len())),
            state: Some("Pending".to_string()),
        })
    }
}

#[derive(Default)]
pub struct FakeEmail {
    pub sent: Mutex<Vec<(String, String, EmailContext)>>,
    pub fail: AtomicBool,
}

impl FakeEmail {
    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl EmailTransport for FakeEmail {
    async fn send(
        &self,
        address: &str,
        text: &str,
        context: &EmailContext,
    ) -> Result<SendReceipt> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError::Transport {
                channel: "email",
                message: "provider rejected the request".to_string(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((address.to_string(), text.to_string(), context.clone()));
        Ok(SendReceipt {
            provider_id: Some("email-1".to_string()),
            state: Some("sent".to_string()),
        })
    }
}

/// Push relay with a configurable number of devices per user
#[derive(Default)]
pub struct FakePush {
    pub devices: Mutex<HashMap<String, u32>>,
    pub sent: Mutex<Vec<(String, String, String)>>,
}

impl FakePush {
    pub fn subscribe(&self, user_id: &str, devices: u32) {
        self.devices
            .lock()
            .unwrap()
            .insert(user_id.to_string(), devices);
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl PushTransport for FakePush {
    async fn send(
        &self,
        subscriber_id: &str,
        title: &str,
        body: &str,
        _data: &PushData,
    ) -> Result<PushOutcome> {
        let devices = self
            .devices
            .lock()
            .unwrap()
            .get(subscriber_id)
            .copied()
            .unwrap_or(0);
        if devices > 0 {
            self.sent.lock().unwrap().push((
                subscriber_id.to_string(),
                title.to_string(),
                body.to_string(),
            ));
        }
        Ok(PushOutcome {
            sent: devices,
            failed: 0,
            total: devices,
        })
    }
}

/// Flags messages containing "prize" as malicious
#[derive(Default)]
pub struct FakeClassifier {
    pub calls: AtomicUsize,
}

impl FakeClassifier {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentClassifier for FakeClassifier {
    async fn classify(&self, text: &str) -> Result<Verdict> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Verdict {
            malicious: text.to_lowercase().contains("prize"),
        })
    }
}

pub struct Fakes {
    pub sms: Arc<FakeSms>,
    pub email: Arc<FakeEmail>,
    pub push: Arc<FakePush>,
    pub classifier: Arc<FakeClassifier>,
    pub counters: Arc<MemoryCounterStore>,
    pub credentials: Arc<MemoryCredentialStore>,
    pub clock: Arc<ManualClock>,
    pub config: Config,
}

impl Fakes {
    pub fn guard(&self) -> CredentialGuard {
        CredentialGuard::new(
            self.credentials.clone(),
            self.clock.clone(),
            self.config.limits.ban_threshold,
        )
    }

    pub fn primary_counter(&self) -> DailyCounter {
        DailyCounter::new(
            PRIMARY_COUNTER,
            self.config.limits.primary_daily,
            self.counters.clone(),
            self.clock.clone(),
        )
    }

    pub fn email_counter(&self) -> DailyCounter {
        DailyCounter::new(
            EMAIL_COUNTER,
            self.config.limits.email_daily,
            self.counters.clone(),
            self.clock.clone(),
        )
    }

    pub fn registration_counter(&self) -> DailyCounter {
        DailyCounter::new(
            REGISTRATION_COUNTER,
            self.config.limits.registration_daily,
            self.counters.clone(),
            self.clock.clone(),
        )
    }

    /// Set today's value of a counter
    pub async fn seed_counter(&self, name: &str, count: u32) {
        let now = self.clock.now();
        let mut record = CounterRecord::new(name, now.date_naive(), now);
        record.count = count;
        self.counters.put(record).await;
    }

    pub async fn issue(&self, phone: &str, email: Option<&str>) -> CredentialRecord {
        self.guard().issue(phone, email, "Corner Shop").await.unwrap()
    }
}

/// Config with memory storage and no request pacing
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.storage.backend = StorageBackend::Memory;
    config.limits.request_interval_secs = 0;
    config
}

pub fn build(config: Config) -> (NotificationService, Fakes) {
    build_with_counters(config, None)
}

/// Like `build`, with the service reading counters from `counters` when given
pub fn build_with_counters(
    config: Config,
    counters: Option<Arc<dyn CounterStore>>,
) -> (NotificationService, Fakes) {
    let fakes = Fakes {
        sms: Arc::new(FakeSms::default()),
        email: Arc::new(FakeEmail::default()),
        push: Arc::new(FakePush::default()),
        classifier: Arc::new(FakeClassifier::default()),
        counters: Arc::new(MemoryCounterStore::new()),
        credentials: Arc::new(MemoryCredentialStore::new()),
        clock: Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 12, 2, 3, 0, 0).unwrap(),
        )),
        config: config.clone(),
    };

    let backends = Backends {
        counters: counters.unwrap_or_else(|| fakes.counters.clone() as Arc<dyn CounterStore>),
        credentials: fakes.credentials.clone(),
        primary: fakes.sms.clone(),
        email: fakes.email.clone(),
        push: fakes.push.clone(),
        classifier: fakes.classifier.clone(),
        clock: fakes.clock.clone(),
    };

    (NotificationService::new(&config, backends), fakes)
}
