use crate::error::{NotifyError, Result};

/// Basic email validation, used when registering an owner contact
pub fn validate_email(email: &str) -> Result<()> {
    if email.is_empty() {
        return Err(NotifyError::InvalidRecipient("Email is empty".to_string()));
    }

    if email.chars().any(char::is_whitespace) {
        return Err(NotifyError::InvalidRecipient(
            "Email cannot contain whitespace".to_string(),
        ));
    }

    let (local, domain) = email
        .split_once('@')
        .ok_or_else(|| NotifyError::InvalidRecipient("Email must contain @".to_string()))?;

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(NotifyError::InvalidRecipient(
            "Invalid email format".to_string(),
        ));
    }

    match domain.rsplit_once('.') {
        Some((host, tld)) if !host.is_empty() && !tld.is_empty() => Ok(()),
        _ => Err(NotifyError::InvalidRecipient(
            "Domain must contain a dot".to_string(),
        )),
    }
}
