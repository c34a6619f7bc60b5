//! Sign-in, sign-out and token issuance for user accounts

use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use super::blocking;
use crate::auth::{TokenCodec, TokenOptions, TokenType};
use crate::error::{Error, Result};
use crate::password;
use crate::store::Store;

/// Identifier for tokens scoped to account settings changes
pub const SETTINGS_IDENTIFIER: &str = "settings";

/// Identifier for ordinary tokens
pub const GLOBAL_IDENTIFIER: &str = "global";

/// Lifetimes and audience applied to user tokens
#[derive(Debug, Clone)]
pub struct TokenPolicy {
    /// Audience claim (the serving domain)
    pub audience: String,
    /// Access token lifetime in milliseconds
    pub access_ttl_millis: i64,
    /// Refresh token lifetime in milliseconds
    pub refresh_ttl_millis: i64,
    /// Settings token lifetime in milliseconds
    pub settings_ttl_millis: i64,
}

impl TokenPolicy {
    /// Lifetime for a token of the given kind and scope
    pub fn ttl_millis(&self, token_type: TokenType, identifier: &str) -> i64 {
        if identifier == SETTINGS_IDENTIFIER {
            return self.settings_ttl_millis;
        }
        match token_type {
            TokenType::Access => self.access_ttl_millis,
            TokenType::Refresh => self.refresh_ttl_millis,
        }
    }
}

impl Default for TokenPolicy {
    fn default() -> Self {
        const NINETY_DAYS_MILLIS: i64 = 90 * 24 * 60 * 60 * 1000;
        Self {
            audience: "localhost".to_string(),
            access_ttl_millis: NINETY_DAYS_MILLIS,
            refresh_ttl_millis: NINETY_DAYS_MILLIS,
            settings_ttl_millis: NINETY_DAYS_MILLIS,
        }
    }
}

/// Successful sign-in
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignIn {
    /// User id
    pub id: String,
    /// Display name
    pub nickname: String,
    /// Fresh access token
    pub token: String,
    /// Public key, if established
    pub public_key: Option<String>,
    /// Client-encrypted private key, if established
    pub encrypted_private_key: Option<String>,
}

/// Account authentication service
#[derive(Debug, Clone)]
pub struct AuthService {
    store: Store,
    codec: Arc<TokenCodec>,
    policy: TokenPolicy,
}

impl AuthService {
    /// Create the service
    pub fn new(store: Store, codec: Arc<TokenCodec>, policy: TokenPolicy) -> Self {
        Self {
            store,
            codec,
            policy,
        }
    }

    /// The codec used to issue and verify tokens
    pub fn codec(&self) -> &Arc<TokenCodec> {
        &self.codec
    }

    /// Issue a token for a user
    pub async fn issue_user_token(
        &self,
        user_id: &str,
        token_type: TokenType,
        identifier: &str,
    ) -> Result<String> {
        let token = self
            .codec
            .issue(TokenOptions {
                audience: self.policy.audience.clone(),
                subject: user_id.to_string(),
                ttl_millis: self.policy.ttl_millis(token_type, identifier),
                token_type,
                identifier: identifier.to_string(),
            })
            .await?;
        Ok(token)
    }

    /// Check credentials and issue an access token
    pub async fn sign_in(&self, username: &str, password: &str) -> Result<SignIn> {
        let user = self
            .store
            .find_user_by_username(username)
            .await?
            .ok_or_else(|| Error::validation("User not found"))?;

        let submitted = password.to_string();
        let stored = user.password.clone();
        let valid = blocking(move || Ok(password::verify_password(&submitted, &stored))).await?;
        if !valid {
            return Err(Error::validation("Incorrect password"));
        }

        if user.banned {
            return Err(Error::unauthorized("User is banned"));
        }

        let token = self
            .issue_user_token(&user.id, TokenType::Access, GLOBAL_IDENTIFIER)
            .await?;
        let key_pair = self.store.find_key_pair(&user.id).await?;

        info!(user_id = %user.id, "User signed in");
        Ok(SignIn {
            id: user.id,
            nickname: user.nickname,
            token,
            public_key: key_pair.as_ref().map(|k| k.public_key.clone()),
            encrypted_private_key: key_pair.map(|k| k.encrypted_private_key),
        })
    }

    /// Revoke the presented token
    pub async fn sign_out(&self, token: &str) -> Result<()> {
        self.codec.revoke(token).await?;
        Ok(())
    }

    /// Revoke every token of a user
    pub async fn sign_out_all(&self, user_id: &str) -> Result<u64> {
        Ok(self.codec.revoke_all_for_user(user_id).await?)
    }
}
