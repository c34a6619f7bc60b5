//! Administrative account operations

use std::sync::Arc;
use tracing::{info, warn};

use super::users::USER_NOT_FOUND;
use crate::auth::TokenCodec;
use crate::error::{Error, Result};
use crate::models::Role;
use crate::store::Store;

/// Admin-only operations
#[derive(Debug, Clone)]
pub struct AdminService {
    store: Store,
    codec: Arc<TokenCodec>,
}

impl AdminService {
    /// Create the service
    pub fn new(store: Store, codec: Arc<TokenCodec>) -> Self {
        Self { store, codec }
    }

    /// A user's role
    pub async fn role(&self, user_id: &str) -> Result<Role> {
        self.store
            .find_user_by_id(user_id)
            .await?
            .map(|u| u.role)
            .ok_or_else(|| Error::unauthorized("User not found"))
    }

    /// Fail unless the user is an admin
    pub async fn require_admin(&self, user_id: &str) -> Result<()> {
        match self.role(user_id).await? {
            Role::Admin => Ok(()),
            Role::User => Err(Error::unauthorized("User is not an admin")),
        }
    }

    /// Ban a user and revoke every token they hold. Returns the user id so
    /// the caller can drop the user's live connections.
    pub async fn ban(&self, username: &str) -> Result<String> {
        let user = self
            .store
            .find_user_by_username(username)
            .await?
            .ok_or_else(|| Error::validation(USER_NOT_FOUND))?;
        if user.role == Role::Admin {
            return Err(Error::validation("Cannot ban an admin"));
        }

        self.store.set_user_banned(&user.id, true).await?;
        let revoked = self.codec.revoke_all_for_user(&user.id).await?;

        warn!(user_id = %user.id, username = %user.username, revoked, "User banned");
        Ok(user.id)
    }

    /// Lift a ban
    pub async fn unban(&self, username: &str) -> Result<String> {
        let user = self
            .store
            .find_user_by_username(username)
            .await?
            .ok_or_else(|| Error::validation(USER_NOT_FOUND))?;

        self.store.set_user_banned(&user.id, false).await?;
        info!(user_id = %user.id, username = %user.username, "User unbanned");
        Ok(user.id)
    }
}
