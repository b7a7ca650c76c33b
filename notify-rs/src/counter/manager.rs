use std::sync::Arc;
use tracing::{debug, info};

use super::store::CounterStore;
use super::types::{CounterRecord, CounterSnapshot};
use crate::error::Result;
use crate::utils::Clock;

/// Store key of the primary-channel (SMS) counter
pub const PRIMARY_COUNTER: &str = "daily_sms_counter";

/// Store key of the fallback email counter
pub const EMAIL_COUNTER: &str = "daily_email_counter";

/// Store key of the API key registration counter
pub const REGISTRATION_COUNTER: &str = "daily_registration_counter";

/// A named, capped, day-scoped counter
#[derive(Clone)]
pub struct DailyCounter {
    name: String,
    limit: u32,
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
}

impl DailyCounter {
    pub fn new(
        name: impl Into<String>,
        limit: u32,
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        DailyCounter {
            name: name.into(),
            limit,
            store,
            clock,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Today's record (rolled over if the stored day is stale)
    pub async fn get(&self) -> Result<CounterRecord> {
        let now = self.clock.now();
        self.store.load(&self.name, now.date_naive(), now).await
    }

    /// Atomically add one for today; returns the new count
    pub async fn increment(&self) -> Result<u32> {
        let now = self.clock.now();
        let count = self.store.increment(&self.name, now.date_naive(), now).await?;
        debug!("Counter {} incremented to {}/{}", self.name, count, self.limit);
        Ok(count)
    }

    /// Compensate an optimistic increment after a downstream failure
    ///
    /// No-op when the day has changed or the count is already zero.
    pub async fn decrement(&self) -> Result<u32> {
        let now = self.clock.now();
        let count = self.store.decrement(&self.name, now.date_naive(), now).await?;
        debug!("Counter {} rolled back to {}/{}", self.name, count, self.limit);
        Ok(count)
    }

    /// True once today's count has reached the limit
    pub async fn is_exhausted(&self) -> Result<bool> {
        Ok(self.get().await?.count >= self.limit)
    }

    pub async fn remaining(&self) -> Result<u32> {
        Ok(self.limit.saturating_sub(self.get().await?.count))
    }

    pub async fn snapshot(&self) -> Result<CounterSnapshot> {
        let record = self.get().await?;
        Ok(CounterSnapshot::new(
            &self.name,
            record.date,
            record.count,
            self.limit,
        ))
    }

    /// Administrative reset to zero for today
    pub async fn reset(&self) -> Result<CounterRecord> {
        let now = self.clock.now();
        let record = self.store.reset(&self.name, now.date_naive(), now).await?;
        info!("Counter {} manually reset for {}", self.name, record.date);
        Ok(record)
    }
}
