use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::types::{AdmissionDecision, FailurePolicy};
use crate::config::PolicyConfig;
use crate::counter::DailyCounter;
use crate::credential::guard::mask_key;
use crate::credential::{CredentialGuard, CredentialRecord};
use crate::error::{NotifyError, Result};
use crate::transport::{ContentClassifier, Verdict};
use crate::utils::Clock;

/// Ordered admission checks for one request
pub struct AdmissionGate {
    guard: CredentialGuard,
    classifier: Arc<dyn ContentClassifier>,
    primary: DailyCounter,
    clock: Arc<dyn Clock>,
    per_key_daily: u32,
    request_interval: Duration,
    policy: PolicyConfig,
}

impl AdmissionGate {
    pub fn new(
        guard: CredentialGuard,
        classifier: Arc<dyn ContentClassifier>,
        primary: DailyCounter,
        clock: Arc<dyn Clock>,
        per_key_daily: u32,
        request_interval: Duration,
        policy: PolicyConfig,
    ) -> Self {
        AdmissionGate {
            guard,
            classifier,
            primary,
            clock,
            per_key_daily,
            request_interval,
            policy,
        }
    }

    pub fn per_key_daily(&self) -> u32 {
        self.per_key_daily
    }

    /// Run every check for `message` sent with `api_key`
    ///
    /// Rejections come back as errors; a request that clears the gate is
    /// routed either to the primary channel or to the fallback channels.
    pub async fn evaluate(&self, api_key: &str, message: &str) -> Result<AdmissionDecision> {
        let record = self.guard.lookup(api_key).await?;
        self.guard.check_standing(&record)?;

        self.screen_content(&record, message).await?;

        let used = self.guard.usage_today(&record);
        if used >= self.per_key_daily {
            debug!("{} hit the per-key quota ({})", mask_key(api_key), used);
            return Err(NotifyError::DailyQuotaExceeded {
                used,
                limit: self.per_key_daily,
            });
        }

        let exhausted = match self.primary.is_exhausted().await {
            Ok(exhausted) => exhausted,
            Err(e) => tolerate(self.policy.counter_on_error, "primary counter", e, false)?,
        };
        if exhausted {
            info!(
                "Primary capacity exhausted, routing {} to fallback",
                mask_key(api_key)
            );
            return Ok(AdmissionDecision::Fallback(record));
        }

        self.check_pacing(&record)?;

        if let Err(e) = self.guard.touch_request(api_key).await {
            tolerate(self.policy.credential_on_error, "request stamp", e, ())?;
        }

        Ok(AdmissionDecision::Primary(record))
    }

    async fn screen_content(&self, record: &CredentialRecord, message: &str) -> Result<()> {
        let verdict = match self.classifier.classify(message).await {
            Ok(verdict) => verdict,
            Err(e) => tolerate(
                self.policy.classifier_on_error,
                "content classifier",
                e,
                Verdict::default(),
            )?,
        };

        if verdict.malicious {
            let threshold = self.guard.ban_threshold();
            let outcome = self.guard.record_malicious_attempt(&record.api_key).await?;

            if outcome.banned {
                return Err(NotifyError::Banned {
                    reason: outcome
                        .ban_reason
                        .unwrap_or_else(|| crate::credential::BAN_REASON.to_string()),
                    banned_at: outcome.banned_at,
                    error_count: outcome.attempt_count,
                });
            }

            return Err(NotifyError::MaliciousContent {
                attempt_count: outcome.attempt_count,
                attempts_remaining: outcome
                    .attempts_remaining
                    .unwrap_or_else(|| threshold.saturating_sub(outcome.attempt_count)),
                threshold,
            });
        }

        if record.error_count > 0 {
            if let Err(e) = self.guard.reset_attempts(&record.api_key).await {
                tolerate(self.policy.credential_on_error, "attempt reset", e, ())?;
            } else {
                debug!(
                    "Cleared {} malicious attempts for {}",
                    record.error_count,
                    mask_key(&record.api_key)
                );
            }
        }

        Ok(())
    }

    fn check_pacing(&self, record: &CredentialRecord) -> Result<()> {
        if self.request_interval.is_zero() {
            return Ok(());
        }
        let Some(last) = record.last_request_at else {
            return Ok(());
        };

        let elapsed = (self.clock.now() - last).to_std().unwrap_or_default();
        if elapsed >= self.request_interval {
            return Ok(());
        }

        let wait = self.request_interval - elapsed;
        let retry_after_secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
        Err(NotifyError::RequestTooSoon { retry_after_secs })
    }
}

/// Apply a failure policy to a backend error
fn tolerate<T>(policy: FailurePolicy, check: &str, error: NotifyError, fallback: T) -> Result<T> {
    match policy {
        FailurePolicy::Allow => {
            warn!("{} unavailable, failing open: {}", check, error);
            Ok(fallback)
        }
        FailurePolicy::Deny => {
            warn!("{} unavailable, rejecting request: {}", check, error);
            Err(error)
        }
    }
}
