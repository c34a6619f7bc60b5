//! Bearer token issuance and verification
//!
//! Provides:
//! - HMAC-SHA256 signed tokens in `header.payload.signature` form
//! - Revocable token identifiers (`jti`) persisted through [`TokenStore`]
//! - Lazy deletion of expired token records on verification
//!
//! The signing secret is generated once per process and never persisted, so
//! every issued token becomes invalid when the process restarts.

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

/// Size of the process-wide signing secret in bytes.
pub const SECRET_LEN: usize = 256;

/// Signature algorithm advertised in every token header.
pub const TOKEN_ALGORITHM: &str = "HS256";

// ============================================================================
// Error Types
// ============================================================================

/// Token codec errors
///
/// Structural problems (bad base64, wrong segment count, unparseable JSON)
/// all collapse into [`TokenError::Malformed`].
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// Required issuance fields missing or malformed
    #[error("Invalid token options")]
    InvalidOptions,

    /// Token could not be decoded
    #[error("Invalid token")]
    Malformed,

    /// Signature does not recompute with the current secret
    #[error("Signature does not match")]
    SignatureMismatch,

    /// Token record has been deleted or never existed
    #[error("Token does not exist")]
    NotFound,

    /// Token is past its expiry
    #[error("Token has expired")]
    Expired,

    /// Token record was already gone when revocation was attempted
    #[error("Cannot revoke token {0}")]
    CannotRevoke(String),

    /// Persistence failure
    #[error("Token storage error: {0}")]
    Storage(String),
}

/// Token result type
pub type Result<T> = std::result::Result<T, TokenError>;

// ============================================================================
// Wire Types
// ============================================================================

/// Kind of token being issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// Short-lived request credential
    Access,
    /// Long-lived credential used to obtain new access tokens
    Refresh,
}

/// Token header segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenHeader {
    /// Signature algorithm
    pub alg: String,
    /// Token format
    pub typ: String,
}

impl Default for TokenHeader {
    fn default() -> Self {
        Self {
            alg: TOKEN_ALGORITHM.to_string(),
            typ: "JWT".to_string(),
        }
    }
}

/// Token payload segment. Timestamps are milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    /// Issuer
    pub iss: String,
    /// Audience (the serving domain)
    pub aud: String,
    /// Subject (user id)
    pub sub: String,
    /// Expiry
    pub exp: i64,
    /// Issued at
    pub iat: i64,
    /// Unique token identifier
    pub jti: String,
    /// Scope identifier (e.g. `global`, `settings`)
    pub ide: String,
    /// Token kind
    pub typ: TokenType,
}

/// A token whose signature, existence and expiry have all been checked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    /// Decoded header
    pub header: TokenHeader,
    /// Decoded payload
    pub payload: TokenPayload,
}

/// Parameters for [`TokenCodec::issue`]
#[derive(Debug, Clone)]
pub struct TokenOptions {
    /// Audience (the serving domain)
    pub audience: String,
    /// Subject (user id)
    pub subject: String,
    /// Lifetime in milliseconds; zero or negative yields an already-expired token
    pub ttl_millis: i64,
    /// Token kind
    pub token_type: TokenType,
    /// Scope identifier
    pub identifier: String,
}

impl TokenOptions {
    fn validate(&self) -> Result<()> {
        if self.audience.trim().is_empty()
            || self.subject.trim().is_empty()
            || self.identifier.trim().is_empty()
        {
            return Err(TokenError::InvalidOptions);
        }
        Ok(())
    }
}

// ============================================================================
// Persistence Seam
// ============================================================================

/// Persisted form of an issued token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    /// Unique token identifier
    pub jti: String,
    /// Owning user id
    pub user_id: String,
}

/// Storage for revocable token records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Persist a newly issued token record
    async fn create_token(&self, record: &TokenRecord) -> Result<()>;

    /// Look up a token record by identifier
    async fn find_token(&self, jti: &str) -> Result<Option<TokenRecord>>;

    /// Delete a token record, returning whether it existed
    async fn delete_token(&self, jti: &str) -> Result<bool>;

    /// Delete every token record owned by a user, returning how many were removed
    async fn delete_tokens_for_user(&self, user_id: &str) -> Result<u64>;
}

// ============================================================================
// Codec
// ============================================================================

/// Signs, verifies and revokes bearer tokens
pub struct TokenCodec {
    store: Arc<dyn TokenStore>,
    issuer: String,
    secret: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("issuer", &self.issuer)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl TokenCodec {
    /// Create a codec with a freshly generated signing secret
    pub fn new(store: Arc<dyn TokenStore>, issuer: impl Into<String>) -> Self {
        let mut secret = Zeroizing::new(vec![0u8; SECRET_LEN]);
        OsRng.fill_bytes(&mut secret);
        Self {
            store,
            issuer: issuer.into(),
            secret,
        }
    }

    /// Create a codec with a caller-supplied secret
    pub fn with_secret(
        store: Arc<dyn TokenStore>,
        issuer: impl Into<String>,
        secret: Vec<u8>,
    ) -> Result<Self> {
        if secret.is_empty() {
            return Err(TokenError::InvalidOptions);
        }
        Ok(Self {
            store,
            issuer: issuer.into(),
            secret: Zeroizing::new(secret),
        })
    }

    /// Issuer written into every payload
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Issue a token and persist its revocable record
    pub async fn issue(&self, options: TokenOptions) -> Result<String> {
        options.validate()?;

        let now = Utc::now().timestamp_millis();
        let payload = TokenPayload {
            iss: self.issuer.clone(),
            aud: options.audience,
            sub: options.subject,
            exp: now.saturating_add(options.ttl_millis),
            iat: now,
            jti: generate_jti(),
            ide: options.identifier,
            typ: options.token_type,
        };

        let header_segment = encode_segment(&TokenHeader::default())?;
        let payload_segment = encode_segment(&payload)?;
        let signature = self.sign(&header_segment, &payload_segment)?;

        self.store
            .create_token(&TokenRecord {
                jti: payload.jti.clone(),
                user_id: payload.sub.clone(),
            })
            .await?;

        debug!(jti = %payload.jti, user_id = %payload.sub, "Token issued");
        Ok(format!(
            "{}.{}.{}",
            header_segment,
            payload_segment,
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    /// Verify a token's structure, signature, existence and expiry, in that order.
    ///
    /// An expired token's record is deleted as a side effect; a failure to
    /// delete it is logged and otherwise ignored.
    pub async fn verify(&self, token: &str) -> Result<VerifiedToken> {
        let verified = self.decode(token)?;
        self.check_record(&verified.payload).await?;
        Ok(verified)
    }

    /// Revoke a token, returning its signature segment
    pub async fn revoke(&self, token: &str) -> Result<String> {
        let verified = self.decode(token)?;
        let jti = verified.payload.jti.clone();

        match self.check_record(&verified.payload).await {
            Ok(()) => {}
            Err(TokenError::NotFound) => return Err(TokenError::CannotRevoke(jti)),
            Err(e) => return Err(e),
        }

        if !self.store.delete_token(&jti).await? {
            return Err(TokenError::CannotRevoke(jti));
        }

        info!(jti = %jti, user_id = %verified.payload.sub, "Token revoked");
        Ok(token.rsplit('.').next().unwrap_or_default().to_string())
    }

    /// Revoke every token owned by a user
    pub async fn revoke_all_for_user(&self, user_id: &str) -> Result<u64> {
        let removed = self.store.delete_tokens_for_user(user_id).await?;
        info!(user_id = %user_id, removed, "Revoked all tokens for user");
        Ok(removed)
    }

    /// Structural and signature checks only.
    fn decode(&self, token: &str) -> Result<VerifiedToken> {
        let mut segments = token.split('.');
        let (Some(header_segment), Some(payload_segment), Some(signature_segment), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(TokenError::Malformed);
        };

        let header: TokenHeader = decode_segment(header_segment)?;
        let payload: TokenPayload = decode_segment(payload_segment)?;
        if header.alg != TOKEN_ALGORITHM {
            return Err(TokenError::Malformed);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature_segment)
            .map_err(|_| TokenError::Malformed)?;

        let mut mac = self.mac()?;
        mac.update(header_segment.as_bytes());
        mac.update(b".");
        mac.update(payload_segment.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::SignatureMismatch)?;

        Ok(VerifiedToken { header, payload })
    }

    /// Existence before expiry, so a deleted token never reports as expired.
    async fn check_record(&self, payload: &TokenPayload) -> Result<()> {
        if self.store.find_token(&payload.jti).await?.is_none() {
            return Err(TokenError::NotFound);
        }

        if payload.exp <= Utc::now().timestamp_millis() {
            if let Err(e) = self.store.delete_token(&payload.jti).await {
                warn!(jti = %payload.jti, error = %e, "Failed to delete expired token");
            }
            return Err(TokenError::Expired);
        }

        Ok(())
    }

    fn sign(&self, header_segment: &str, payload_segment: &str) -> Result<Vec<u8>> {
        let mut mac = self.mac()?;
        mac.update(header_segment.as_bytes());
        mac.update(b".");
        mac.update(payload_segment.as_bytes());
        Ok(mac.finalize().into_bytes().to_vec())
    }

    fn mac(&self) -> Result<HmacSha256> {
        <HmacSha256 as Mac>::new_from_slice(&self.secret).map_err(|_| TokenError::InvalidOptions)
    }
}

fn generate_jti() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn encode_segment<T: Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_vec(value).map_err(|_| TokenError::InvalidOptions)?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn decode_segment<T: DeserializeOwned>(segment: &str) -> Result<T> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
}
