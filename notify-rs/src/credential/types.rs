use chrono::{DateTime, NaiveDate, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Reason stamped on keys banned for malicious content
pub const BAN_REASON: &str = "Malicious messages detected";

/// Prefix of issued API keys
pub const API_KEY_PREFIX: &str = "sk-";

/// A registered caller and its admission state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Secret presented in `x-api-key`
    pub api_key: String,
    /// Stable owner id, used to address push notifications
    pub user_id: String,
    pub project_name: String,
    pub phone_number: String,
    /// Owner email, enables the email fallback
    pub email: Option<String>,
    pub is_active: bool,
    pub banned: bool,
    pub ban_reason: Option<String>,
    pub banned_at: Option<DateTime<Utc>>,
    /// Consecutive malicious-content attempts
    pub error_count: u32,
    /// Messages sent on `usage_date`
    pub daily_usage: u32,
    pub usage_date: Option<NaiveDate>,
    /// Last request accepted for delivery (or flagged as malicious)
    pub last_request_at: Option<DateTime<Utc>>,
    pub last_malicious_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Last activity on this key
    pub updated_at: DateTime<Utc>,
}

impl CredentialRecord {
    /// Issue a fresh active credential with a random key and user id
    pub fn issue(
        phone_number: String,
        email: Option<String>,
        project_name: String,
        now: DateTime<Utc>,
    ) -> Self {
        CredentialRecord {
            api_key: format!("{}{}", API_KEY_PREFIX, random_hex(12)),
            user_id: random_hex(10),
            project_name,
            phone_number,
            email,
            is_active: true,
            banned: false,
            ban_reason: None,
            banned_at: None,
            error_count: 0,
            daily_usage: 0,
            usage_date: None,
            last_request_at: None,
            last_malicious_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Messages sent today; usage recorded on an earlier day counts as zero
    pub fn usage_on(&self, today: NaiveDate) -> u32 {
        match self.usage_date {
            Some(date) if date == today => self.daily_usage,
            _ => 0,
        }
    }

    /// Count one malicious attempt, banning at `threshold`
    pub fn apply_malicious_attempt(
        &mut self,
        threshold: u32,
        now: DateTime<Utc>,
    ) -> MaliciousOutcome {
        self.error_count = self.error_count.saturating_add(1);
        self.last_malicious_at = Some(now);
        self.last_request_at = Some(now);
        self.updated_at = now;

        if self.error_count >= threshold {
            if !self.banned {
                self.ban_reason = Some(BAN_REASON.to_string());
                self.banned_at = Some(now);
            }
            self.banned = true;
            self.is_active = false;
        }

        MaliciousOutcome::from_record(self, threshold)
    }

    /// Count one delivered message for `today`
    pub fn apply_usage(&mut self, today: NaiveDate, now: DateTime<Utc>) -> u32 {
        self.daily_usage = self.usage_on(today).saturating_add(1);
        self.usage_date = Some(today);
        self.updated_at = now;
        self.daily_usage
    }
}

/// Result of recording a malicious attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaliciousOutcome {
    pub banned: bool,
    pub attempt_count: u32,
    /// Attempts left before the ban; absent once banned
    pub attempts_remaining: Option<u32>,
    pub ban_reason: Option<String>,
    pub banned_at: Option<DateTime<Utc>>,
}

impl MaliciousOutcome {
    pub(crate) fn from_record(record: &CredentialRecord, threshold: u32) -> Self {
        MaliciousOutcome {
            banned: record.banned,
            attempt_count: record.error_count,
            attempts_remaining: (!record.banned)
                .then(|| threshold.saturating_sub(record.error_count)),
            ban_reason: record.ban_reason.clone(),
            banned_at: record.banned_at,
        }
    }
}

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    buf.iter().map(|b| format!("{:02x}", b)).collect()
}
