use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Invalid API key format")]
    InvalidApiKey,

    #[error("Unknown API key")]
    UnknownApiKey,

    #[error("Already registered: {0}")]
    Conflict(String),

    #[error("API key is inactive")]
    Inactive,

    #[error("API key has been banned: {reason}")]
    Banned {
        reason: String,
        banned_at: Option<DateTime<Utc>>,
        error_count: u32,
    },

    #[error("Malicious or scam message detected (attempt {attempt_count}/{threshold})")]
    MaliciousContent {
        attempt_count: u32,
        attempts_remaining: u32,
        threshold: u32,
    },

    #[error("Message limit reached ({used}/{limit})")]
    DailyQuotaExceeded { used: u32, limit: u32 },

    #[error("Rate limit exceeded. Try again in {retry_after_secs} second(s)")]
    RequestTooSoon { retry_after_secs: u64 },

    #[error("System capacity limit reached. Please try again tomorrow")]
    CapacityExceeded,

    #[error("Registration limit reached for today. Please try again tomorrow")]
    RegistrationLimitReached { limit: u32, reset_date: NaiveDate },

    #[error("Transport error ({channel}): {message}")]
    Transport {
        channel: &'static str,
        message: String,
    },

    #[error("Delivery handler timed out after {0} second(s)")]
    HandlerTimeout(u64),

    #[error("Delivery queue was cleared before this message was sent")]
    QueueCleared,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl NotifyError {
    /// Stable machine-readable reason, used by API clients to tell rejections apart
    pub fn code(&self) -> &'static str {
        match self {
            NotifyError::Io(_) | NotifyError::Storage(_) | NotifyError::Database(_) => {
                "storage_error"
            }
            NotifyError::Json(_) => "storage_error",
            NotifyError::Config(_) => "config_error",
            NotifyError::InvalidRecipient(_) => "invalid_recipient",
            NotifyError::InvalidMessage(_) => "invalid_message",
            NotifyError::InvalidApiKey => "invalid_api_key",
            NotifyError::UnknownApiKey => "unknown_api_key",
            NotifyError::Conflict(_) => "conflict",
            NotifyError::Inactive => "inactive",
            NotifyError::Banned { .. } => "banned",
            NotifyError::MaliciousContent { .. } => "malicious_content",
            NotifyError::DailyQuotaExceeded { .. } => "daily_quota_exceeded",
            NotifyError::RequestTooSoon { .. } => "request_too_soon",
            NotifyError::CapacityExceeded => "capacity_exceeded",
            NotifyError::RegistrationLimitReached { .. } => "registration_limit_reached",
            NotifyError::Transport { .. } => "transport_error",
            NotifyError::HandlerTimeout(_) => "handler_timeout",
            NotifyError::QueueCleared => "queue_cleared",
            NotifyError::Unauthorized(_) => "unauthorized",
        }
    }

    /// True for backend failures (store unreachable, bad rows) as opposed to policy rejections
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            NotifyError::Io(_)
                | NotifyError::Storage(_)
                | NotifyError::Database(_)
                | NotifyError::Json(_)
        )
    }

    pub(crate) fn transport(channel: &'static str, message: impl Into<String>) -> Self {
        NotifyError::Transport {
            channel,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, NotifyError>;
