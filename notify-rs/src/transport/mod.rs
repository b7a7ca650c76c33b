//! Outbound delivery channels and the content classifier
//!
//! The core only sees the traits below; `sms`, `email`, `push` and
//! `classifier` hold the HTTP clients used in production.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{NotifyError, Result};

pub mod classifier;
pub mod email;
pub mod push;
pub mod sms;

pub use classifier::ChatClassifier;
pub use email::BrevoEmailTransport;
pub use push::PushRelayTransport;
pub use sms::SmsGateTransport;

/// Provider acknowledgement for a single send
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SendReceipt {
    /// Provider message id, when one is returned
    pub provider_id: Option<String>,
    /// Provider-reported state (e.g. "Pending")
    pub state: Option<String>,
}

/// Context attached to a fallback email
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailContext {
    pub project_name: String,
    /// Phone number the message was meant for
    pub original_recipient: String,
}

/// Payload data attached to a push notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushData {
    pub url: String,
    pub recipient: String,
    pub timestamp: DateTime<Utc>,
}

/// Fan-out result across a subscriber's devices
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushOutcome {
    pub sent: u32,
    pub failed: u32,
    pub total: u32,
}

impl PushOutcome {
    /// At least one device received the notification
    pub fn delivered(&self) -> bool {
        self.sent > 0
    }
}

/// Classifier decision for one message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub malicious: bool,
}

/// Primary channel (SMS)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PrimaryTransport: Send + Sync {
    async fn send(&self, recipient: &str, text: &str) -> Result<SendReceipt>;
}

/// Secondary channel (email to the credential owner)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, address: &str, text: &str, context: &EmailContext)
        -> Result<SendReceipt>;
}

/// Tertiary channel (push to the credential owner's devices)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn send(
        &self,
        subscriber_id: &str,
        title: &str,
        body: &str,
        data: &PushData,
    ) -> Result<PushOutcome>;
}

/// Malicious-content screening
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentClassifier: Send + Sync {
    /// Errors mean the classifier could not be reached; unparseable answers are clean
    async fn classify(&self, text: &str) -> Result<Verdict>;
}

pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| NotifyError::Config(format!("HTTP client: {}", e)))
}

/// Turn a non-2xx response into a transport error carrying the body
pub(crate) async fn ensure_success(
    channel: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(NotifyError::transport(
        channel,
        format!("{} - {}", status, body),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_delivered_needs_one_device() {
        assert!(!PushOutcome::default().delivered());
        assert!(!PushOutcome {
            sent: 0,
            failed: 2,
            total: 2
        }
        .delivered());
        assert!(PushOutcome {
            sent: 1,
            failed: 1,
            total: 2
        }
        .delivered());
    }
}
