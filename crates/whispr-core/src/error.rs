//! Error types for whispr-core
//!
//! Every failure a service can surface is classified into one of three kinds
//! (validation, unauthorized, server). Server-kind failures never expose their
//! cause to clients.

use crate::auth::TokenError;
use thiserror::Error;

/// Message returned to clients for any server-kind failure.
pub const GENERIC_SERVER_MESSAGE: &str = "Something went wrong. We're not sure what happened.";

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or rejected input
    #[error("{0}")]
    Validation(String),

    /// Missing, invalid or insufficient credentials
    #[error("{0}")]
    Unauthorized(String),

    /// Token codec failure
    #[error(transparent)]
    Token(#[from] TokenError),

    /// Database failure
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Client-facing classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input (HTTP 400)
    Validation,
    /// Bad or missing credentials (HTTP 401)
    Unauthorized,
    /// Unexpected failure (HTTP 500)
    Server,
}

impl Error {
    /// Shorthand for a validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Shorthand for an authorization failure.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::Unauthorized(_) => ErrorKind::Unauthorized,
            Error::Token(TokenError::Storage(_)) => ErrorKind::Server,
            Error::Token(TokenError::InvalidOptions) => ErrorKind::Validation,
            Error::Token(_) => ErrorKind::Unauthorized,
            Error::Database(_) | Error::Serialization(_) | Error::Internal(_) => ErrorKind::Server,
        }
    }

    /// Message safe to show to a client.
    pub fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::Server => GENERIC_SERVER_MESSAGE.to_string(),
            _ => self.to_string(),
        }
    }

    /// Whether this error wraps a database unique-constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Error::Database(sqlx::Error::Database(db)) => db.is_unique_violation(),
            _ => false,
        }
    }
}
