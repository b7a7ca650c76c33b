//! REST API module for notify-rs
//!
//! Provides the HTTP surface over the notification service

pub mod handlers;
pub mod server;

pub use handlers::{ApiError, AppState};
pub use server::ApiServer;
