//! Authorization middleware for Axum
//!
//! Verifies the `Authorization: Bearer <token>` header of every request that
//! is not on the exemption list and attaches an [`AuthSession`] for handlers,
//! which pick it up through the [`RequireSession`] extractor.

use axum::{
    extract::{FromRequestParts, OriginalUri, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::debug;
use whispr_core::{TokenCodec, TokenError};

use crate::api::error::{ApiError, INVALID_INPUT};
use crate::api::AppState;

/// Routes reachable without a bearer token. `*` matches any one segment.
pub const EXEMPT_ROUTES: &[&str] = &[
    "v0/users/register",
    "v0/users/get-user-password-salt/*",
    "v0/auth/sign-in",
    // The gateway checks its own token during the handshake
    "v0/gateway",
    "v0/gateway/*",
];

/// Caller identity attached to authorized requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub user_id: String,
    /// The bearer token the request presented
    pub token: String,
}

/// Segment-wise route comparison.
///
/// Both sides must have the same number of segments; `*` in the pattern
/// matches any single segment.
pub fn route_matches(pattern: &str, path: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('/').collect();
    let path: Vec<&str> = path.split('/').collect();

    pattern.len() == path.len()
        && pattern
            .iter()
            .zip(&path)
            .all(|(expected, actual)| *expected == "*" || expected == actual)
}

/// Whether a request path skips authorization. In production every route
/// lives under `/api`, which is ignored here.
pub fn is_exempt(path: &str, production: bool) -> bool {
    let path = path.trim_start_matches('/');
    let path = if production {
        path.strip_prefix("api/").unwrap_or(path)
    } else {
        path
    };
    EXEMPT_ROUTES.iter().any(|pattern| route_matches(pattern, path))
}

/// Gate every non-exempt request on a valid bearer token
pub async fn authorize(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    if req.method() == Method::OPTIONS {
        return (
            StatusCode::OK,
            Json(json!({ "message": "Preflight check successful." })),
        )
            .into_response();
    }

    let path = req
        .extensions()
        .get::<OriginalUri>()
        .map(|uri| uri.0.path().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    if is_exempt(&path, state.info.env.is_production()) {
        return next.run(req).await;
    }

    match authenticate(&state.codec, req.headers()).await {
        Ok(session) => {
            req.extensions_mut().insert(session);
            next.run(req).await
        }
        Err(rejection) => {
            debug!(path = %path, reason = %rejection.message(), "Request rejected");
            rejection.into_response()
        }
    }
}

/// Resolve the caller from the request headers
pub async fn authenticate(
    codec: &TokenCodec,
    headers: &HeaderMap,
) -> std::result::Result<AuthSession, ApiError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| ApiError::unauthorized("`Authorization` header required"))?;

    let not_bearer = || ApiError::unauthorized("`Authorization` header must be a Bearer token");
    let value = header.to_str().map_err(|_| not_bearer())?;
    let rest = value.strip_prefix("Bearer").ok_or_else(not_bearer)?;
    if !rest.is_empty() && !rest.starts_with(' ') {
        return Err(not_bearer());
    }

    let token = rest.trim();
    if token.is_empty() {
        return Err(ApiError::unauthorized("No token provided"));
    }

    match codec.verify(token).await {
        Ok(verified) => Ok(AuthSession {
            user_id: verified.payload.sub,
            token: token.to_string(),
        }),
        Err(TokenError::Storage(_)) | Err(TokenError::InvalidOptions) => {
            Err(ApiError::validation(INVALID_INPUT))
        }
        Err(e) => Err(ApiError::unauthorized(e.to_string())),
    }
}

// ============================================================================
// RequireSession Extractor
// ============================================================================

/// Axum extractor for the session attached by [`authorize`].
pub struct RequireSession(pub AuthSession);

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for RequireSession
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthSession>()
            .cloned()
            .map(RequireSession)
            .ok_or_else(|| ApiError::unauthorized("No session found"))
    }
}

#[cfg(test)]
mod tests;
