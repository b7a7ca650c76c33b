//! Push relay client
//!
//! Subscriptions live in the relay, not here. Browsers manage them through
//! the relay's own routes (`POST /push/subscribe`, `POST /push/unsubscribe`,
//! `GET /push/status` and `GET /push/vapid` for the public VAPID key), and
//! the relay signs every push with its VAPID key pair. This client only
//! calls `POST {relay_url}/notify`, which fans one notification out to every
//! device subscribed for a user id.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ensure_success, http_client, PushData, PushOutcome, PushTransport};
use crate::config::PushConfig;
use crate::error::{NotifyError, Result};

const CHANNEL: &str = "push";

/// Maximum push body length before truncation
pub const MAX_PUSH_BODY: usize = 100;

pub struct PushRelayTransport {
    client: reqwest::Client,
    relay_url: String,
}

#[derive(Debug, Serialize)]
struct RelayRequest<'a> {
    user_id: &'a str,
    title: &'a str,
    body: &'a str,
    data: &'a PushData,
}

#[derive(Debug, Deserialize)]
struct RelayResponse {
    #[serde(default)]
    sent: u32,
    #[serde(default)]
    failed: u32,
    #[serde(default)]
    total: u32,
}

impl PushRelayTransport {
    pub fn from_config(config: &PushConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            relay_url: config.relay_url.trim_end_matches('/').to_string(),
        })
    }
}

/// Shorten a message to fit a notification body
pub fn truncate_body(message: &str) -> String {
    if message.chars().count() <= MAX_PUSH_BODY {
        return message.to_string();
    }
    let head: String = message.chars().take(MAX_PUSH_BODY).collect();
    format!("{}...", head)
}

#[async_trait]
impl PushTransport for PushRelayTransport {
    async fn send(
        &self,
        subscriber_id: &str,
        title: &str,
        body: &str,
        data: &PushData,
    ) -> Result<PushOutcome> {
        let request = RelayRequest {
            user_id: subscriber_id,
            title,
            body,
            data,
        };

        let response = self
            .client
            .post(format!("{}/notify", self.relay_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!("Push relay unreachable: {}", e);
                NotifyError::transport(CHANNEL, e.to_string())
            })?;

        let response = ensure_success(CHANNEL, response).await?;
        let body: RelayResponse = response
            .json()
            .await
            .map_err(|e| NotifyError::transport(CHANNEL, e.to_string()))?;

        debug!(
            "Push relay: {}/{} delivered, {} failed",
            body.sent, body.total, body.failed
        );

        Ok(PushOutcome {
            sent: body.sent,
            failed: body.failed,
            total: body.total,
        })
    }
}
