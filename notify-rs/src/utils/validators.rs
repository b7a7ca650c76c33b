//! Request validation
//!
//! Runs before admission: a request failing here mutates no state.

use crate::error::{NotifyError, Result};
use regex::Regex;
use std::sync::OnceLock;

/// Maximum message length in UTF-16 code units, as counted by browser clients
pub const MAX_MESSAGE_LENGTH: usize = 1000;

/// Minimum API key length (exclusive)
pub const MIN_API_KEY_LENGTH: usize = 20;

fn ph_mobile_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\+639\d{9}$").expect("static regex"))
}

/// Normalize a Philippine mobile number to `+639XXXXXXXXX`
///
/// Accepts `09…`, `639…` and `+639…` forms, with spaces or dashes.
pub fn normalize_ph_number(phone: &str) -> Result<String> {
    let cleaned: String = phone
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();

    if cleaned.is_empty() {
        return Err(NotifyError::InvalidRecipient(
            "recipient is required".to_string(),
        ));
    }

    let normalized = if let Some(rest) = cleaned.strip_prefix('0') {
        format!("+63{}", rest)
    } else if cleaned.starts_with("639") {
        format!("+{}", cleaned)
    } else {
        cleaned
    };

    if !ph_mobile_regex().is_match(&normalized) {
        return Err(NotifyError::InvalidRecipient(
            "Invalid Philippine phone number format".to_string(),
        ));
    }

    Ok(normalized)
}

/// Validate message text: non-empty, bounded, and without links
pub fn validate_message(message: &str) -> Result<()> {
    if message.trim().is_empty() {
        return Err(NotifyError::InvalidMessage(
            "Message cannot be empty".to_string(),
        ));
    }

    if message.encode_utf16().count() > MAX_MESSAGE_LENGTH {
        return Err(NotifyError::InvalidMessage(format!(
            "Message exceeds maximum length of {} characters",
            MAX_MESSAGE_LENGTH
        )));
    }

    if message.to_lowercase().contains("http") {
        return Err(NotifyError::InvalidMessage(
            "Links are not allowed in messages".to_string(),
        ));
    }

    Ok(())
}

/// API keys are `sk-` or `sk_` followed by an opaque token
pub fn is_valid_api_key_format(key: &str) -> bool {
    (key.starts_with("sk-") || key.starts_with("sk_")) && key.len() > MIN_API_KEY_LENGTH
}
