//! Domain services
//!
//! Thin layers over [`Store`](crate::store::Store) that enforce the account,
//! channel and message rules, translate persistence failures into
//! client-facing errors, and publish server events on every mutation.

pub mod admin;
pub mod auth;
pub mod channels;
pub mod users;

pub use admin::AdminService;
pub use auth::{AuthService, SignIn, TokenPolicy};
pub use channels::{ChannelService, MESSAGES_PER_PAGE};
pub use users::UserService;

use uuid::Uuid;

use crate::error::{Error, Result};

/// Generate a new entity id
pub(crate) fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Parse a client-supplied id, reporting `message` as a validation error
pub(crate) fn parse_id(id: &str, message: &str) -> Result<String> {
    Uuid::parse_str(id)
        .map(|u| u.to_string())
        .map_err(|_| Error::validation(message))
}

/// Run a CPU-heavy closure off the async executor
pub(crate) async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Internal(format!("blocking task failed: {}", e)))?
}

#[cfg(test)]
mod tests;
