use crate::error::{NotifyError, Result};
use crate::gate::FailurePolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    pub sms_gateway: SmsGatewayConfig,
    pub email: EmailConfig,
    pub push: PushConfig,
    pub classifier: ClassifierConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub listen_addr: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub database_url: String,
}

/// Fixed admission limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimitsConfig {
    /// Messages per API key per day
    #[serde(default = "default_per_key_daily")]
    pub per_key_daily: u32,
    /// Messages over the primary (SMS) channel per day, all keys combined
    #[serde(default = "default_primary_daily")]
    pub primary_daily: u32,
    /// Fallback emails per day, all keys combined
    #[serde(default = "default_email_daily")]
    pub email_daily: u32,
    /// Malicious attempts before a key is banned
    #[serde(default = "default_ban_threshold")]
    pub ban_threshold: u32,
    /// Spacing between successful deliveries for one key
    #[serde(default = "default_delivery_cooldown_secs")]
    pub delivery_cooldown_secs: u64,
    /// Minimum spacing between accepted requests for one key (0 disables)
    #[serde(default = "default_request_interval_secs")]
    pub request_interval_secs: u64,
    /// Upper bound on a single queued delivery
    #[serde(default = "default_handler_timeout_secs")]
    pub handler_timeout_secs: u64,
    /// New API keys issued per day, all callers combined
    #[serde(default = "default_registration_daily")]
    pub registration_daily: u32,
}

impl LimitsConfig {
    pub fn delivery_cooldown(&self) -> Duration {
        Duration::from_secs(self.delivery_cooldown_secs)
    }

    pub fn request_interval(&self) -> Duration {
        Duration::from_secs(self.request_interval_secs)
    }

    pub fn handler_timeout(&self) -> Duration {
        Duration::from_secs(self.handler_timeout_secs)
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            per_key_daily: default_per_key_daily(),
            primary_daily: default_primary_daily(),
            email_daily: default_email_daily(),
            ban_threshold: default_ban_threshold(),
            delivery_cooldown_secs: default_delivery_cooldown_secs(),
            request_interval_secs: default_request_interval_secs(),
            handler_timeout_secs: default_handler_timeout_secs(),
            registration_daily: default_registration_daily(),
        }
    }
}

/// What each admission check does when its backend is unreachable
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub classifier_on_error: FailurePolicy,
    #[serde(default)]
    pub counter_on_error: FailurePolicy,
    #[serde(default)]
    pub credential_on_error: FailurePolicy,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            classifier_on_error: FailurePolicy::Allow,
            counter_on_error: FailurePolicy::Allow,
            credential_on_error: FailurePolicy::Allow,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SmsGatewayConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    #[serde(default = "default_signature")]
    pub signature: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmailConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub sender_name: String,
    pub sender_email: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PushConfig {
    /// Relay that fans a notification out to a user's push subscriptions
    pub relay_url: String,
    #[serde(default = "default_push_click_url")]
    pub click_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClassifierConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AdminConfig {
    /// Token expected in `x-admin-token`; admin routes are disabled when unset
    pub token: Option<String>,
}

fn default_per_key_daily() -> u32 {
    20
}

fn default_primary_daily() -> u32 {
    300
}

fn default_email_daily() -> u32 {
    290
}

fn default_ban_threshold() -> u32 {
    3
}

fn default_delivery_cooldown_secs() -> u64 {
    2
}

fn default_request_interval_secs() -> u64 {
    10
}

fn default_handler_timeout_secs() -> u64 {
    30
}

fn default_registration_daily() -> u32 {
    50
}

fn default_signature() -> String {
    "Sent via SMS API Philippines".to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_temperature() -> f32 {
    0.1
}

fn default_push_click_url() -> String {
    "/".to_string()
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NotifyError::Config(e.to_string()))?;

        toml::from_str(&content).map_err(|e| NotifyError::Config(e.to_string()))
    }

    pub fn default() -> Self {
        Self {
            server: ServerConfig {
                listen_addr: "0.0.0.0:3000".to_string(),
            },
            storage: StorageConfig {
                backend: StorageBackend::Sqlite,
                database_url: "sqlite://notify.db?mode=rwc".to_string(),
            },
            limits: LimitsConfig::default(),
            policy: PolicyConfig::default(),
            sms_gateway: SmsGatewayConfig {
                url: "https://api.sms-gate.app/3rdparty/v1/messages".to_string(),
                username: String::new(),
                password: String::new(),
                signature: default_signature(),
                timeout_secs: default_timeout(),
            },
            email: EmailConfig {
                api_url: "https://api.brevo.com/v3".to_string(),
                api_key: None,
                sender_name: "SMS API Philippines".to_string(),
                sender_email: "noreply@localhost".to_string(),
                timeout_secs: default_timeout(),
            },
            push: PushConfig {
                relay_url: "http://localhost:8088".to_string(),
                click_url: default_push_click_url(),
                timeout_secs: default_timeout(),
            },
            classifier: ClassifierConfig {
                url: "https://gen.pollinations.ai/v1/chat/completions".to_string(),
                api_key: None,
                model: "openai".to_string(),
                temperature: default_temperature(),
                timeout_secs: default_timeout(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
            admin: AdminConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_limits() {
        let limits = LimitsConfig::default();
        assert_eq!(limits.per_key_daily, 20);
        assert_eq!(limits.primary_daily, 300);
        assert_eq!(limits.email_daily, 290);
        assert_eq!(limits.ban_threshold, 3);
        assert_eq!(limits.delivery_cooldown(), Duration::from_secs(2));
        assert_eq!(limits.registration_daily, 50);
    }

    #[test]
    fn test_from_file_fills_optional_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[server]
listen_addr = "127.0.0.1:8080"

[storage]
backend = "memory"
database_url = "sqlite::memory:"

[limits]
primary_daily = 50

[policy]
classifier_on_error = "deny"

[sms_gateway]
url = "http://gateway.test/messages"
username = "user"
password = "pass"

[email]
api_url = "http://email.test"
sender_name = "Relay"
sender_email = "relay@example.com"

[push]
relay_url = "http://push.test"

[classifier]
url = "http://classifier.test"
model = "test-model"

[logging]
level = "debug"
format = "json"
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.limits.primary_daily, 50);
        assert_eq!(config.limits.per_key_daily, 20);
        assert_eq!(config.policy.classifier_on_error, FailurePolicy::Deny);
        assert_eq!(config.policy.counter_on_error, FailurePolicy::Allow);
        assert_eq!(config.sms_gateway.timeout_secs, 10);
        assert!(config.admin.token.is_none());
    }

    #[test]
    fn test_from_file_missing() {
        let result = Config::from_file("/nonexistent/notify.toml");
        assert!(matches!(result, Err(NotifyError::Config(_))));
    }
}
