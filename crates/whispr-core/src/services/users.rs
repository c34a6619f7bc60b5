//! Account registration, lookup and key-pair management

use chrono::Utc;
use regex::Regex;
use std::sync::LazyLock;
use tracing::info;

use super::auth::{AuthService, GLOBAL_IDENTIFIER};
use super::{blocking, new_id};
use crate::auth::TokenType;
use crate::error::{Error, Result};
use crate::models::{KeyPair, PublicProfile, Role, User};
use crate::password;
use crate::store::Store;

static USERNAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]{3,20}$").expect("valid username pattern"));

/// Rejection message for usernames outside the allowed pattern
pub const USERNAME_RULES: &str = "Username must be between 3 and 20 characters and can only contain letters, numbers, underscores and hyphens.";

/// Lookup failure message
pub const USER_NOT_FOUND: &str = "Specified user was not found.";

/// Whether a username is acceptable
pub fn is_valid_username(username: &str) -> bool {
    USERNAME_PATTERN.is_match(username)
}

/// User account service
#[derive(Debug, Clone)]
pub struct UserService {
    store: Store,
    auth: AuthService,
}

impl UserService {
    /// Create the service
    pub fn new(store: Store, auth: AuthService) -> Self {
        Self { store, auth }
    }

    /// Create an account and issue its first access token
    pub async fn register(
        &self,
        username: &str,
        nickname: &str,
        password: &str,
    ) -> Result<(User, String)> {
        if !is_valid_username(username) {
            return Err(Error::validation(USERNAME_RULES));
        }
        if nickname.trim().is_empty() || password.is_empty() {
            return Err(Error::validation("Invalid input"));
        }

        let submitted = password.to_string();
        let hashed = blocking(move || password::hash_password(&submitted)).await?;

        let user = User {
            id: new_id(),
            username: username.to_string(),
            nickname: nickname.to_string(),
            password: hashed,
            role: Role::User,
            banned: false,
            created_at: Utc::now(),
        };

        if let Err(e) = self.store.create_user(&user).await {
            if e.is_unique_violation() {
                return Err(Error::validation("Username already exists"));
            }
            return Err(e);
        }

        let token = self
            .auth
            .issue_user_token(&user.id, TokenType::Access, GLOBAL_IDENTIFIER)
            .await?;

        info!(user_id = %user.id, username = %user.username, "User registered");
        Ok((user, token))
    }

    /// Find a user by login name
    pub async fn get_by_username(&self, username: &str) -> Result<User> {
        self.store
            .find_user_by_username(username)
            .await?
            .ok_or_else(|| Error::validation(USER_NOT_FOUND))
    }

    /// Find a user by id
    pub async fn get_by_id(&self, user_id: &str) -> Result<User> {
        self.store
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| Error::validation(USER_NOT_FOUND))
    }

    /// Public view of a user. The encrypted private key is only included
    /// when the requester owns the account.
    pub async fn profile(&self, user: &User, requester_id: &str) -> Result<PublicProfile> {
        let key_pair = self.store.find_key_pair(&user.id).await?;
        let is_owner = user.id == requester_id;

        Ok(PublicProfile {
            id: user.id.clone(),
            username: user.username.clone(),
            nickname: user.nickname.clone(),
            created_at: user.created_at,
            public_key: key_pair.as_ref().map(|k| k.public_key.clone()),
            encrypted_private_key: key_pair
                .filter(|_| is_owner)
                .map(|k| k.encrypted_private_key),
        })
    }

    /// Client salt of a user's stored password
    pub async fn password_salt(&self, username: &str) -> Result<String> {
        let user = self.get_by_username(username).await?;
        password::client_salt(&user.password)
            .map(str::to_string)
            .ok_or_else(|| Error::Internal(format!("stored password for {} is malformed", user.id)))
    }

    /// Establish a user's key pair. Key pairs cannot be replaced.
    pub async fn set_key_pair(
        &self,
        user_id: &str,
        encrypted_private_key: &str,
        public_key: &str,
    ) -> Result<()> {
        const ALREADY_SET: &str = "Specified user has already established key pair.";

        if self.store.find_key_pair(user_id).await?.is_some() {
            return Err(Error::validation(ALREADY_SET));
        }

        let key_pair = KeyPair {
            public_key: public_key.to_string(),
            encrypted_private_key: encrypted_private_key.to_string(),
        };
        match self.store.create_key_pair(user_id, &key_pair).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_unique_violation() => Err(Error::validation(ALREADY_SET)),
            Err(e) => Err(e),
        }
    }
}
