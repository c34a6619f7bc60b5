//! NotificationBus - in-process fan-out from domain services to gateway sessions.
//!
//! Services publish a [`ServerEvent`] together with the ids of the users it
//! concerns; every gateway session subscribes a callback and forwards the
//! events addressed to its own user.

/// Subscriber registry and asynchronous delivery.
pub mod bus;
/// Event tags and notification payloads.
pub mod types;

pub use bus::{NotificationBus, Subscription};
pub use types::{Notification, ServerEvent};
