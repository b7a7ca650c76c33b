use serde::{Deserialize, Serialize};
use std::fmt;

use crate::transport::{PushOutcome, SendReceipt};

/// Channel that actually delivered a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryChannel {
    #[serde(rename = "sms")]
    Primary,
    #[serde(rename = "email_fallback")]
    EmailFallback,
    #[serde(rename = "web_push")]
    WebPush,
}

impl DeliveryChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryChannel::Primary => "sms",
            DeliveryChannel::EmailFallback => "email_fallback",
            DeliveryChannel::WebPush => "web_push",
        }
    }
}

impl fmt::Display for DeliveryChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a successful fallback delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackDelivery {
    pub channel: DeliveryChannel,
    /// Address or subscriber the message went to
    pub delivered_to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<SendReceipt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push: Option<PushOutcome>,
    /// Email counter value after this send
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_count: Option<u32>,
}
