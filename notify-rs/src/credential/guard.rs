use std::sync::Arc;
use tracing::{info, warn};

use super::store::CredentialStore;
use super::types::{CredentialRecord, MaliciousOutcome, BAN_REASON};
use crate::error::{NotifyError, Result};
use crate::utils::{is_valid_api_key_format, normalize_ph_number, validate_email, Clock};

/// Per-credential admission state: usage, malicious attempts and bans
#[derive(Clone)]
pub struct CredentialGuard {
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    ban_threshold: u32,
}

impl CredentialGuard {
    pub fn new(store: Arc<dyn CredentialStore>, clock: Arc<dyn Clock>, ban_threshold: u32) -> Self {
        CredentialGuard {
            store,
            clock,
            ban_threshold,
        }
    }

    pub fn ban_threshold(&self) -> u32 {
        self.ban_threshold
    }

    /// Resolve an API key, rejecting malformed keys before touching the store
    pub async fn lookup(&self, api_key: &str) -> Result<CredentialRecord> {
        if !is_valid_api_key_format(api_key) {
            return Err(NotifyError::InvalidApiKey);
        }

        self.store
            .find(api_key)
            .await?
            .ok_or(NotifyError::UnknownApiKey)
    }

    pub async fn is_banned(&self, api_key: &str) -> Result<bool> {
        Ok(self.lookup(api_key).await?.banned)
    }

    pub async fn is_active(&self, api_key: &str) -> Result<bool> {
        Ok(self.lookup(api_key).await?.is_active)
    }

    /// Reject banned or deactivated credentials
    pub fn check_standing(&self, record: &CredentialRecord) -> Result<()> {
        if record.banned {
            return Err(NotifyError::Banned {
                reason: record
                    .ban_reason
                    .clone()
                    .unwrap_or_else(|| BAN_REASON.to_string()),
                banned_at: record.banned_at,
                error_count: record.error_count,
            });
        }
        if !record.is_active {
            return Err(NotifyError::Inactive);
        }
        Ok(())
    }

    pub async fn record_malicious_attempt(&self, api_key: &str) -> Result<MaliciousOutcome> {
        let outcome = self
            .store
            .record_malicious_attempt(api_key, self.ban_threshold, self.clock.now())
            .await?;

        if outcome.banned {
            warn!(
                "API key {} banned after {} malicious attempts",
                mask_key(api_key),
                outcome.attempt_count
            );
        } else {
            warn!(
                "Malicious message from {} (attempt {}/{})",
                mask_key(api_key),
                outcome.attempt_count,
                self.ban_threshold
            );
        }

        Ok(outcome)
    }

    /// Forgive earlier malicious attempts after a clean message
    pub async fn reset_attempts(&self, api_key: &str) -> Result<()> {
        self.store.reset_attempts(api_key, self.clock.now()).await
    }

    pub async fn record_usage(&self, api_key: &str) -> Result<u32> {
        let now = self.clock.now();
        self.store
            .record_usage(api_key, now.date_naive(), now)
            .await
    }

    pub async fn touch_request(&self, api_key: &str) -> Result<()> {
        self.store.touch_request(api_key, self.clock.now()).await
    }

    pub async fn deactivate(&self, api_key: &str) -> Result<()> {
        self.store.deactivate(api_key, self.clock.now()).await?;
        info!("API key {} deactivated", mask_key(api_key));
        Ok(())
    }

    /// Messages sent today by this credential
    pub fn usage_today(&self, record: &CredentialRecord) -> u32 {
        record.usage_on(self.clock.today())
    }

    /// Register a new credential for a phone owner
    ///
    /// Phone numbers and emails may each hold only one key.
    pub async fn issue(
        &self,
        phone_number: &str,
        email: Option<&str>,
        project_name: &str,
    ) -> Result<CredentialRecord> {
        let phone_number = normalize_ph_number(phone_number)?;

        let email = match email.map(str::trim).filter(|e| !e.is_empty()) {
            Some(email) => {
                validate_email(email)?;
                Some(email.to_lowercase())
            }
            None => None,
        };

        let project_name = project_name.trim();
        if project_name.is_empty() {
            return Err(NotifyError::InvalidMessage(
                "Project name is required".to_string(),
            ));
        }

        if let Some(email) = &email {
            if self.store.email_exists(email).await? {
                return Err(NotifyError::Conflict(
                    "Email already has an API key".to_string(),
                ));
            }
        }
        if self.store.phone_exists(&phone_number).await? {
            return Err(NotifyError::Conflict(
                "Phone number already has an API key".to_string(),
            ));
        }

        let record = CredentialRecord::issue(
            phone_number,
            email,
            project_name.to_string(),
            self.clock.now(),
        );
        self.store.insert(&record).await?;

        info!(
            "Issued API key {} for project {}",
            mask_key(&record.api_key),
            record.project_name
        );
        Ok(record)
    }
}

/// Shorten a key for logs
pub(crate) fn mask_key(api_key: &str) -> String {
    let visible: String = api_key.chars().take(8).collect();
    format!("{}...", visible)
}
