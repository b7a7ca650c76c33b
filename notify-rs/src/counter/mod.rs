/// Day-scoped delivery counters
///
/// This module provides the system-wide daily caps:
/// - Primary (SMS) sends per day
/// - Fallback email sends per day
/// - API key registrations per day
///
/// Every operation first rolls a stale record over to the current UTC day.

pub mod manager;
pub mod store;
pub mod types;

pub use manager::{DailyCounter, EMAIL_COUNTER, PRIMARY_COUNTER, REGISTRATION_COUNTER};
pub use store::{CounterStore, MemoryCounterStore, SqliteCounterStore};
pub use types::{CounterRecord, CounterSnapshot};
