use serde::{Deserialize, Serialize};

use crate::credential::CredentialRecord;

/// Behaviour of an admission check whose backend is unavailable
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Skip the check and keep going (fail open)
    #[default]
    Allow,
    /// Reject the request with the backend error
    Deny,
}

/// Outcome of a request that cleared admission
#[derive(Debug, Clone, PartialEq)]
pub enum AdmissionDecision {
    /// Deliver over the primary channel
    Primary(CredentialRecord),
    /// Primary capacity is exhausted; deliver through the fallback channels
    Fallback(CredentialRecord),
}

impl AdmissionDecision {
    pub fn credential(&self) -> &CredentialRecord {
        match self {
            AdmissionDecision::Primary(record) | AdmissionDecision::Fallback(record) => record,
        }
    }
}
