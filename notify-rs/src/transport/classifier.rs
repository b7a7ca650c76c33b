//! Malicious-content classifier over an OpenAI-compatible chat endpoint
//!
//! The model is asked to answer `{"malicious": "true"}` or
//! `{"malicious": "false"}`. Anything else is read as clean.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ensure_success, http_client, ContentClassifier, Verdict};
use crate::config::ClassifierConfig;
use crate::error::{NotifyError, Result};

const CHANNEL: &str = "classifier";

const SYSTEM_PROMPT: &str = r#"You are a cybersecurity classifier specialized in SMS threat detection.

Decide whether the SMS message contains malicious intent. A message is malicious if its primary intent is to deceive, manipulate, defraud, impersonate, or trick the recipient into taking harmful action.

A message is NOT malicious if it is a normal greeting, a legitimate service notification, a standard OTP message that does not try to extract confidential information, or informational without deceptive intent. Do not assume malicious intent without clear indicators of deception or harm.

Return ONLY valid JSON in exactly one of the following formats:
{"malicious": "true"}
{"malicious": "false"}"#;

pub struct ChatClassifier {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: String,
}

impl ChatClassifier {
    pub fn from_config(config: &ClassifierConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            url: config.url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

/// Read the model's answer; malformed output counts as clean
pub fn parse_verdict(content: &str) -> Verdict {
    // Models sometimes wrap the JSON in a code fence
    let trimmed = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let malicious = match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(value) => match value.get("malicious") {
            Some(serde_json::Value::String(s)) => s.eq_ignore_ascii_case("true"),
            Some(serde_json::Value::Bool(b)) => *b,
            _ => false,
        },
        Err(e) => {
            warn!("Unparseable classifier answer ({}): {:?}", e, content);
            false
        }
    };

    Verdict { malicious }
}

#[async_trait]
impl ContentClassifier for ChatClassifier {
    async fn classify(&self, text: &str) -> Result<Verdict> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
            temperature: self.temperature,
            max_tokens: 150,
        };

        let mut builder = self.client.post(&self.url).json(&request);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| NotifyError::transport(CHANNEL, e.to_string()))?;
        let response = ensure_success(CHANNEL, response).await?;

        let body: ChatResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!("Classifier returned an unexpected body: {}", e);
                return Ok(Verdict::default());
            }
        };

        let content = body
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or_default();
        debug!("Classifier answer: {}", content);

        Ok(parse_verdict(content))
    }
}
