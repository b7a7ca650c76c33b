/// Fallback delivery
///
/// Used only when the system-wide primary quota is exhausted. Channels are
/// tried in order and the first success wins:
/// 1. Email to the credential owner (bounded by its own daily counter)
/// 2. Push to the credential owner's devices

pub mod dispatcher;
pub mod types;

pub use dispatcher::FallbackDispatcher;
pub use types::{DeliveryChannel, FallbackDelivery};
