//! Per-key delivery serialization
//!
//! Each API key owns a FIFO lane. One drain task per busy lane runs jobs one
//! at a time and waits out a fixed cool-down after every successful delivery.
//!
//! ```text
//! IDLE ──submit──> PROCESSING ──ok──> COOLING_DOWN ──> PROCESSING | IDLE
//!                      │
//!                      └──err──> PROCESSING | IDLE
//! ```
//!
//! Lanes live only in memory; a restart starts with every lane empty.

pub mod delivery;

pub use delivery::{DeliveryQueue, QueueStats};
