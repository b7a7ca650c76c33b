//! Credential persistence backends
//!
//! Mutations are expressed as single atomic operations so concurrent requests
//! for the same key cannot lose an attempt or a usage increment.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::types::{CredentialRecord, MaliciousOutcome, BAN_REASON};
use crate::counter::store::parse_timestamp;
use crate::error::{NotifyError, Result};

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find(&self, api_key: &str) -> Result<Option<CredentialRecord>>;

    async fn insert(&self, record: &CredentialRecord) -> Result<()>;

    async fn email_exists(&self, email: &str) -> Result<bool>;

    async fn phone_exists(&self, phone_number: &str) -> Result<bool>;

    /// Increment the attempt counter, banning once it reaches `threshold`
    async fn record_malicious_attempt(
        &self,
        api_key: &str,
        threshold: u32,
        now: DateTime<Utc>,
    ) -> Result<MaliciousOutcome>;

    async fn reset_attempts(&self, api_key: &str, now: DateTime<Utc>) -> Result<()>;

    /// Count one delivered message; returns today's usage
    async fn record_usage(&self, api_key: &str, today: NaiveDate, now: DateTime<Utc>)
        -> Result<u32>;

    async fn touch_request(&self, api_key: &str, now: DateTime<Utc>) -> Result<()>;

    async fn deactivate(&self, api_key: &str, now: DateTime<Utc>) -> Result<()>;
}

/// Process-local credential table
#[derive(Default)]
pub struct MemoryCredentialStore {
    records: RwLock<HashMap<String, CredentialRecord>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn update<T>(
        &self,
        api_key: &str,
        f: impl FnOnce(&mut CredentialRecord) -> T + Send,
    ) -> Result<T> {
        let mut records = self.records.write().await;
        let record = records.get_mut(api_key).ok_or(NotifyError::UnknownApiKey)?;
        Ok(f(record))
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find(&self, api_key: &str) -> Result<Option<CredentialRecord>> {
        let records = self.records.read().await;
        Ok(records.get(api_key).cloned())
    }

    async fn insert(&self, record: &CredentialRecord) -> Result<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.api_key) {
            return Err(NotifyError::Conflict("API key already exists".to_string()));
        }
        records.insert(record.api_key.clone(), record.clone());
        Ok(())
    }

    async fn email_exists(&self, email: &str) -> Result<bool> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .any(|r| r.email.as_deref() == Some(email)))
    }

    async fn phone_exists(&self, phone_number: &str) -> Result<bool> {
        let records = self.records.read().await;
        Ok(records.values().any(|r| r.phone_number == phone_number))
    }

    async fn record_malicious_attempt(
        &self,
        api_key: &str,
        threshold: u32,
        now: DateTime<Utc>,
    ) -> Result<MaliciousOutcome> {
        self.update(api_key, |r| r.apply_malicious_attempt(threshold, now))
            .await
    }

    async fn reset_attempts(&self, api_key: &str, now: DateTime<Utc>) -> Result<()> {
        self.update(api_key, |r| {
            r.error_count = 0;
            r.last_malicious_at = None;
            r.updated_at = now;
        })
        .await
    }

    async fn record_usage(
        &self,
        api_key: &str,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<u32> {
        self.update(api_key, |r| r.apply_usage(today, now)).await
    }

    async fn touch_request(&self, api_key: &str, now: DateTime<Utc>) -> Result<()> {
        self.update(api_key, |r| r.last_request_at = Some(now)).await
    }

    async fn deactivate(&self, api_key: &str, now: DateTime<Utc>) -> Result<()> {
        self.update(api_key, |r| {
            r.is_active = false;
            r.updated_at = now;
        })
        .await
    }
}

/// SQLite-backed credential table
pub struct SqliteCredentialStore {
    db: SqlitePool,
}

impl SqliteCredentialStore {
    /// Create a new credential store
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Initialize database tables
    pub async fn init_db(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS credentials (
                api_key TEXT PRIMARY KEY,
                user_id TEXT NOT NULL UNIQUE,
                project_name TEXT NOT NULL,
                phone_number TEXT NOT NULL,
                email TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                banned INTEGER NOT NULL DEFAULT 0,
                ban_reason TEXT,
                banned_at TEXT,
                error_count INTEGER NOT NULL DEFAULT 0,
                daily_usage INTEGER NOT NULL DEFAULT 0,
                usage_date TEXT,
                last_request_at TEXT,
                last_malicious_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_credentials_email ON credentials(email)")
            .execute(&self.db)
            .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_credentials_phone ON credentials(phone_number)",
        )
        .execute(&self.db)
        .await?;

        Ok(())
    }

    fn row_to_record(row: SqliteRow) -> Result<CredentialRecord> {
        let optional_ts = |column: &str| -> Result<Option<DateTime<Utc>>> {
            row.try_get::<Option<String>, _>(column)?
                .map(|s| parse_timestamp(&s))
                .transpose()
        };

        let usage_date = row
            .try_get::<Option<String>, _>("usage_date")?
            .map(|s| {
                NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                    .map_err(|e| NotifyError::Storage(e.to_string()))
            })
            .transpose()?;

        Ok(CredentialRecord {
            api_key: row.try_get("api_key")?,
            user_id: row.try_get("user_id")?,
            project_name: row.try_get("project_name")?,
            phone_number: row.try_get("phone_number")?,
            email: row.try_get("email")?,
            is_active: row.try_get("is_active")?,
            banned: row.try_get("banned")?,
            ban_reason: row.try_get("ban_reason")?,
            banned_at: optional_ts("banned_at")?,
            error_count: to_u32(row.try_get("error_count")?),
            daily_usage: to_u32(row.try_get("daily_usage")?),
            usage_date,
            last_request_at: optional_ts("last_request_at")?,
            last_malicious_at: optional_ts("last_malicious_at")?,
            created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
            updated_at: parse_timestamp(&row.try_get::<String, _>("updated_at")?)?,
        })
    }
}

fn to_u32(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn find(&self, api_key: &str) -> Result<Option<CredentialRecord>> {
        let row = sqlx::query("SELECT * FROM credentials WHERE api_key = ?")
            .bind(api_key)
            .fetch_optional(&self.db)
            .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn insert(&self, record: &CredentialRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO credentials (
                api_key, user_id, project_name, phone_number, email,
                is_active, banned, ban_reason, banned_at, error_count,
                daily_usage, usage_date, last_request_at, last_malicious_at,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.api_key)
        .bind(&record.user_id)
        .bind(&record.project_name)
        .bind(&record.phone_number)
        .bind(&record.email)
        .bind(record.is_active)
        .bind(record.banned)
        .bind(&record.ban_reason)
        .bind(record.banned_at.map(|t| t.to_rfc3339()))
        .bind(record.error_count as i64)
        .bind(record.daily_usage as i64)
        .bind(record.usage_date.map(|d| d.format("%Y-%m-%d").to_string()))
        .bind(record.last_request_at.map(|t| t.to_rfc3339()))
        .bind(record.last_malicious_at.map(|t| t.to_rfc3339()))
        .bind(record.created_at.to_rfc3339())
        .bind(record.updated_at.to_rfc3339())
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn email_exists(&self, email: &str) -> Result<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM credentials WHERE email = ? LIMIT 1")
                .bind(email)
                .fetch_optional(&self.db)
                .await?;
        Ok(found.is_some())
    }

    async fn phone_exists(&self, phone_number: &str) -> Result<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM credentials WHERE phone_number = ? LIMIT 1")
                .bind(phone_number)
                .fetch_optional(&self.db)
                .await?;
        Ok(found.is_some())
    }

    async fn record_malicious_attempt(
        &self,
        api_key: &str,
        threshold: u32,
        now: DateTime<Utc>,
    ) -> Result<MaliciousOutcome> {
        let now = now.to_rfc3339();
        let threshold = threshold as i64;

        // SET expressions all see the pre-update row, so `error_count + 1` is the new count
        let row = sqlx::query_as::<_, (i64, bool, Option<String>, Option<String>)>(
            r#"
            UPDATE credentials SET
                error_count = error_count + 1,
                last_malicious_at = ?,
                last_request_at = ?,
                updated_at = ?,
                banned = CASE WHEN error_count + 1 >= ? THEN 1 ELSE banned END,
                is_active = CASE WHEN error_count + 1 >= ? THEN 0 ELSE is_active END,
                ban_reason = CASE WHEN banned = 0 AND error_count + 1 >= ?
                                  THEN ? ELSE ban_reason END,
                banned_at = CASE WHEN banned = 0 AND error_count + 1 >= ?
                                 THEN ? ELSE banned_at END
            WHERE api_key = ?
            RETURNING error_count, banned, ban_reason, banned_at
            "#,
        )
        .bind(&now)
        .bind(&now)
        .bind(&now)
        .bind(threshold)
        .bind(threshold)
        .bind(threshold)
        .bind(BAN_REASON)
        .bind(threshold)
        .bind(&now)
        .bind(api_key)
        .fetch_optional(&self.db)
        .await?
        .ok_or(NotifyError::UnknownApiKey)?;

        let (error_count, banned, ban_reason, banned_at) = row;
        let attempt_count = to_u32(error_count);

        Ok(MaliciousOutcome {
            banned,
            attempt_count,
            attempts_remaining: (!banned)
                .then(|| (threshold as u32).saturating_sub(attempt_count)),
            ban_reason,
            banned_at: banned_at.map(|s| parse_timestamp(&s)).transpose()?,
        })
    }

    async fn reset_attempts(&self, api_key: &str, now: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE credentials
            SET error_count = 0, last_malicious_at = NULL, updated_at = ?
            WHERE api_key = ?
            "#,
        )
        .bind(now.to_rfc3339())
        .bind(api_key)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(NotifyError::UnknownApiKey);
        }
        Ok(())
    }

    async fn record_usage(
        &self,
        api_key: &str,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<u32> {
        let today = today.format("%Y-%m-%d").to_string();

        let usage: i64 = sqlx::query_scalar(
            r#"
            UPDATE credentials SET
                daily_usage = CASE WHEN usage_date = ? THEN daily_usage + 1 ELSE 1 END,
                usage_date = ?,
                updated_at = ?
            WHERE api_key = ?
            RETURNING daily_usage
            "#,
        )
        .bind(&today)
        .bind(&today)
        .bind(now.to_rfc3339())
        .bind(api_key)
        .fetch_optional(&self.db)
        .await?
        .ok_or(NotifyError::UnknownApiKey)?;

        Ok(to_u32(usage))
    }

    async fn touch_request(&self, api_key: &str, now: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query("UPDATE credentials SET last_request_at = ? WHERE api_key = ?")
            .bind(now.to_rfc3339())
            .bind(api_key)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(NotifyError::UnknownApiKey);
        }
        Ok(())
    }

    async fn deactivate(&self, api_key: &str, now: DateTime<Utc>) -> Result<()> {
        let result =
            sqlx::query("UPDATE credentials SET is_active = 0, updated_at = ? WHERE api_key = ?")
                .bind(now.to_rfc3339())
                .bind(api_key)
                .execute(&self.db)
                .await?;

        if result.rows_affected() == 0 {
            return Err(NotifyError::UnknownApiKey);
        }
        Ok(())
    }
}
