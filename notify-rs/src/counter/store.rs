//! Counter persistence backends
//!
//! Both backends apply rollover and delta in one atomic step: a single mutex
//! section in memory, a single `INSERT .. ON CONFLICT DO UPDATE .. RETURNING`
//! statement in SQLite. Concurrent increments therefore never lose updates.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqlitePool;
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::types::CounterRecord;
use crate::error::{NotifyError, Result};

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Read the counter, rolling it over to `today` first
    async fn load(&self, name: &str, today: NaiveDate, now: DateTime<Utc>)
        -> Result<CounterRecord>;

    /// Roll over if stale, then add one; returns the new count
    async fn increment(&self, name: &str, today: NaiveDate, now: DateTime<Utc>) -> Result<u32>;

    /// Roll over if stale, then subtract one if the count is positive
    async fn decrement(&self, name: &str, today: NaiveDate, now: DateTime<Utc>) -> Result<u32>;

    /// Force the counter to zero for `today`
    async fn reset(&self, name: &str, today: NaiveDate, now: DateTime<Utc>)
        -> Result<CounterRecord>;
}

/// Process-local counters
#[derive(Default)]
pub struct MemoryCounterStore {
    records: Mutex<HashMap<String, CounterRecord>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a counter directly (admin import, tests)
    pub async fn put(&self, record: CounterRecord) {
        let mut records = self.records.lock().await;
        records.insert(record.name.clone(), record);
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn load(
        &self,
        name: &str,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<CounterRecord> {
        let mut records = self.records.lock().await;
        let record = records
            .entry(name.to_string())
            .or_insert_with(|| CounterRecord::new(name, today, now));
        record.roll_over(today, now);
        Ok(record.clone())
    }

    async fn increment(&self, name: &str, today: NaiveDate, now: DateTime<Utc>) -> Result<u32> {
        let mut records = self.records.lock().await;
        let record = records
            .entry(name.to_string())
            .or_insert_with(|| CounterRecord::new(name, today, now));
        record.roll_over(today, now);
        record.count = record.count.saturating_add(1);
        record.updated_at = now;
        Ok(record.count)
    }

    async fn decrement(&self, name: &str, today: NaiveDate, now: DateTime<Utc>) -> Result<u32> {
        let mut records = self.records.lock().await;
        let Some(record) = records.get_mut(name) else {
            return Ok(0);
        };
        record.roll_over(today, now);
        if record.count > 0 {
            record.count -= 1;
            record.updated_at = now;
        }
        Ok(record.count)
    }

    async fn reset(
        &self,
        name: &str,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<CounterRecord> {
        let mut records = self.records.lock().await;
        let record = CounterRecord::new(name, today, now);
        records.insert(name.to_string(), record.clone());
        Ok(record)
    }
}

/// SQLite-backed counters, shared by every worker using the same database
pub struct SqliteCounterStore {
    db: SqlitePool,
}

type CounterRow = (String, i64, String, String);

impl SqliteCounterStore {
    /// Create a new counter store
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Initialize database tables
    pub async fn init_db(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS daily_counters (
                name TEXT PRIMARY KEY,
                date TEXT NOT NULL,
                count INTEGER NOT NULL DEFAULT 0,
                last_reset TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        Ok(())
    }

    fn row_to_record(name: &str, row: CounterRow) -> Result<CounterRecord> {
        let (date, count, last_reset, updated_at) = row;
        Ok(CounterRecord {
            name: name.to_string(),
            date: NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .map_err(|e| NotifyError::Storage(e.to_string()))?,
            count: count_from_db(count),
            last_reset: parse_timestamp(&last_reset)?,
            updated_at: parse_timestamp(&updated_at)?,
        })
    }
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| NotifyError::Storage(e.to_string()))
}

fn count_from_db(count: i64) -> u32 {
    u32::try_from(count.max(0)).unwrap_or(u32::MAX)
}

#[async_trait]
impl CounterStore for SqliteCounterStore {
    async fn load(
        &self,
        name: &str,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<CounterRecord> {
        let today = today.format("%Y-%m-%d").to_string();
        let now = now.to_rfc3339();

        let row = sqlx::query_as::<_, CounterRow>(
            r#"
            INSERT INTO daily_counters (name, date, count, last_reset, created_at, updated_at)
            VALUES (?, ?, 0, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                count = CASE WHEN daily_counters.date = excluded.date
                             THEN daily_counters.count ELSE 0 END,
                last_reset = CASE WHEN daily_counters.date = excluded.date
                                  THEN daily_counters.last_reset ELSE excluded.last_reset END,
                updated_at = CASE WHEN daily_counters.date = excluded.date
                                  THEN daily_counters.updated_at ELSE excluded.updated_at END,
                date = excluded.date
            RETURNING date, count, last_reset, updated_at
            "#,
        )
        .bind(name)
        .bind(&today)
        .bind(&now)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.db)
        .await?;

        Self::row_to_record(name, row)
    }

    async fn increment(&self, name: &str, today: NaiveDate, now: DateTime<Utc>) -> Result<u32> {
        let today = today.format("%Y-%m-%d").to_string();
        let now = now.to_rfc3339();

        let count: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO daily_counters (name, date, count, last_reset, created_at, updated_at)
            VALUES (?, ?, 1, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                count = CASE WHEN daily_counters.date = excluded.date
                             THEN daily_counters.count + 1 ELSE 1 END,
                last_reset = CASE WHEN daily_counters.date = excluded.date
                                  THEN daily_counters.last_reset ELSE excluded.last_reset END,
                updated_at = excluded.updated_at,
                date = excluded.date
            RETURNING count
            "#,
        )
        .bind(name)
        .bind(&today)
        .bind(&now)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.db)
        .await?;

        Ok(count_from_db(count))
    }

    async fn decrement(&self, name: &str, today: NaiveDate, now: DateTime<Utc>) -> Result<u32> {
        let today = today.format("%Y-%m-%d").to_string();
        let now = now.to_rfc3339();

        let count: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO daily_counters (name, date, count, last_reset, created_at, updated_at)
            VALUES (?, ?, 0, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                count = CASE WHEN daily_counters.date <> excluded.date THEN 0
                             WHEN daily_counters.count > 0 THEN daily_counters.count - 1
                             ELSE daily_counters.count END,
                last_reset = CASE WHEN daily_counters.date = excluded.date
                                  THEN daily_counters.last_reset ELSE excluded.last_reset END,
                updated_at = excluded.updated_at,
                date = excluded.date
            RETURNING count
            "#,
        )
        .bind(name)
        .bind(&today)
        .bind(&now)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.db)
        .await?;

        Ok(count_from_db(count))
    }

    async fn reset(
        &self,
        name: &str,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<CounterRecord> {
        let today = today.format("%Y-%m-%d").to_string();
        let now = now.to_rfc3339();

        let row = sqlx::query_as::<_, CounterRow>(
            r#"
            INSERT INTO daily_counters (name, date, count, last_reset, created_at, updated_at)
            VALUES (?, ?, 0, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                count = 0,
                last_reset = excluded.last_reset,
                updated_at = excluded.updated_at,
                date = excluded.date
            RETURNING date, count, last_reset, updated_at
            "#,
        )
        .bind(name)
        .bind(&today)
        .bind(&now)
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.db)
        .await?;

        Self::row_to_record(name, row)
    }
}
