/// Admission control
///
/// Checks run in a fixed order and stop at the first verdict:
/// 1. Ban / active status
/// 2. Content screening (malicious attempts escalate towards a ban)
/// 3. Per-key daily quota
/// 4. System-wide primary quota (exhaustion hands off to the fallback channels)
/// 5. Per-key request pacing

pub mod admission;
pub mod types;

pub use admission::AdmissionGate;
pub use types::{AdmissionDecision, FailurePolicy};
