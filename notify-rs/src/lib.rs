//! notify-rs: Outbound SMS relay with admission control and fallback delivery
//!
//! Clients submit a message for a Philippine mobile number. Every request is
//! screened before it may use the shared SMS capacity, and when that capacity
//! runs out the message is handed to the credential owner by email or push.
//!
//! # Features
//!
//! - **Admission gate**: ban status, content screening, per-key quota, global
//!   quota and request pacing, checked in that order
//! - **Ban escalation**: three malicious messages permanently ban a key
//! - **Per-key delivery queue**: one delivery in flight per key, with a fixed
//!   cool-down after each success
//! - **Daily counters**: atomic, UTC day-scoped, backed by SQLite or memory
//! - **Fallback**: email first, then push, only when SMS capacity is exhausted
//!
//! # Example
//!
//! ```no_run
//! use notify_rs::config::Config;
//! use notify_rs::service::{Backends, NotificationService, SendRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let backends = Backends::from_config(&config).await?;
//!     let service = NotificationService::new(&config, backends);
//!
//!     let outcome = service
//!         .send(
//!             "sk-0123456789abcdef01234567",
//!             SendRequest {
//!                 recipient: "09171234567".to_string(),
//!                 message: "Your order is ready for pickup".to_string(),
//!             },
//!         )
//!         .await?;
//!     println!("delivered via {}", outcome.delivery.delivery_method);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration management
//! - [`error`]: Error types and handling
//! - [`counter`]: Day-scoped delivery counters
//! - [`credential`]: API key state, usage and bans
//! - [`queue`]: Per-key delivery serialization
//! - [`gate`]: Ordered admission checks
//! - [`fallback`]: Email and push fallback
//! - [`transport`]: Channel clients and the content classifier
//! - [`service`]: Request orchestration
//! - [`api`]: HTTP surface
//! - [`utils`]: Clock and validation helpers

pub mod api;
pub mod config;
pub mod counter;
pub mod credential;
pub mod error;
pub mod fallback;
pub mod gate;
pub mod queue;
pub mod service;
pub mod transport;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use error::{NotifyError, Result};
pub use service::{Backends, NotificationService};
