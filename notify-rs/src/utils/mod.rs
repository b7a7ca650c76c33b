//! Utility modules
//!
//! - [`clock`]: wall-clock abstraction shared by counters and credentials
//! - [`email`]: Email address validation
//! - [`validators`]: Recipient, message and API key validation

pub mod clock;
pub mod email;
pub mod validators;

pub use clock::{Clock, ManualClock, SystemClock};
pub use email::validate_email;
pub use validators::{is_valid_api_key_format, normalize_ph_number, validate_message};
