//! SMS gateway client
//!
//! Posts `{textMessage: {text}, phoneNumbers: [..]}` with basic auth.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ensure_success, http_client, PrimaryTransport, SendReceipt};
use crate::config::SmsGatewayConfig;
use crate::error::{NotifyError, Result};

const CHANNEL: &str = "sms";

pub struct SmsGateTransport {
    client: reqwest::Client,
    url: String,
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GatewayRequest<'a> {
    text_message: TextMessage<'a>,
    phone_numbers: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
struct TextMessage<'a> {
    text: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct GatewayResponse {
    id: Option<String>,
    state: Option<String>,
}

impl SmsGateTransport {
    pub fn from_config(config: &SmsGatewayConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            url: config.url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }
}

#[async_trait]
impl PrimaryTransport for SmsGateTransport {
    async fn send(&self, recipient: &str, text: &str) -> Result<SendReceipt> {
        let request = GatewayRequest {
            text_message: TextMessage { text },
            phone_numbers: vec![recipient],
        };

        let response = self
            .client
            .post(&self.url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!("SMS gateway unreachable: {}", e);
                NotifyError::transport(CHANNEL, e.to_string())
            })?;

        let response = ensure_success(CHANNEL, response).await?;

        // Some gateway versions answer with an empty body
        let body: GatewayResponse = response.json().await.unwrap_or_default();
        debug!("SMS gateway accepted message, state={:?}", body.state);

        Ok(SendReceipt {
            provider_id: body.id,
            state: body.state,
        })
    }
}
