//! Transactional email client (Brevo-compatible `/smtp/email` endpoint)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ensure_success, http_client, EmailContext, EmailTransport, SendReceipt};
use crate::config::EmailConfig;
use crate::error::{NotifyError, Result};

const CHANNEL: &str = "email";

pub struct BrevoEmailTransport {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    sender: Contact,
}

#[derive(Debug, Clone, Serialize)]
struct Contact {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    email: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmailRequest<'a> {
    sender: &'a Contact,
    to: Vec<Contact>,
    subject: String,
    text_content: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmailResponse {
    message_id: Option<String>,
}

impl BrevoEmailTransport {
    pub fn from_config(config: &EmailConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            sender: Contact {
                name: Some(config.sender_name.clone()),
                email: config.sender_email.clone(),
            },
        })
    }
}

/// Subject line for a fallback email
pub fn fallback_subject(context: &EmailContext) -> String {
    format!("Message from {}", context.project_name)
}

/// Plain-text body for a fallback email
pub fn fallback_body(text: &str, context: &EmailContext) -> String {
    format!(
        "Original recipient: {}\n\n{}",
        context.original_recipient, text
    )
}

#[async_trait]
impl EmailTransport for BrevoEmailTransport {
    async fn send(
        &self,
        address: &str,
        text: &str,
        context: &EmailContext,
    ) -> Result<SendReceipt> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| NotifyError::transport(CHANNEL, "email service not configured"))?;

        let request = EmailRequest {
            sender: &self.sender,
            to: vec![Contact {
                name: None,
                email: address.to_string(),
            }],
            subject: fallback_subject(context),
            text_content: fallback_body(text, context),
        };

        let response = self
            .client
            .post(format!("{}/smtp/email", self.api_url))
            .header("api-key", api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!("Email API unreachable: {}", e);
                NotifyError::transport(CHANNEL, e.to_string())
            })?;

        let response = ensure_success(CHANNEL, response).await?;
        let body: EmailResponse = response.json().await.unwrap_or_default();
        debug!("Fallback email accepted, message_id={:?}", body.message_id);

        Ok(SendReceipt {
            provider_id: body.message_id,
            state: Some("sent".to_string()),
        })
    }
}
