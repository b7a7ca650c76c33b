/// API key credentials
///
/// This module tracks, per key:
/// - Daily usage against the per-key cap
/// - Malicious-content attempts and the permanent ban they lead to
/// - Last accepted request, for request pacing

pub mod guard;
pub mod store;
pub mod types;

pub use guard::CredentialGuard;
pub use store::{CredentialStore, MemoryCredentialStore, SqliteCredentialStore};
pub use types::{CredentialRecord, MaliciousOutcome, BAN_REASON};
