//! Sign-in and sign-out
//!
//! POST /v0/auth/sign-in      - Exchange credentials for a token
//! POST /v0/auth/sign-out     - Revoke the presented token
//! POST /v0/auth/sign-out-all - Revoke every token of the caller

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::Deserialize;
use tracing::info;
use whispr_core::services::SignIn;

use super::error::{ApiJson, ApiResult};
use super::AppState;
use crate::middleware::auth::RequireSession;

/// Sign-in body
#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub username: String,
    /// `"<derived>:<clientSalt>"`
    pub password: String,
}

pub async fn sign_in(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SignInRequest>,
) -> ApiResult<Json<SignIn>> {
    let signed_in = state
        .auth
        .sign_in(&request.username, &request.password)
        .await?;
    Ok(Json(signed_in))
}

pub async fn sign_out(
    State(state): State<AppState>,
    RequireSession(session): RequireSession,
) -> ApiResult<StatusCode> {
    state.auth.sign_out(&session.token).await?;
    Ok(StatusCode::OK)
}

pub async fn sign_out_all(
    State(state): State<AppState>,
    RequireSession(session): RequireSession,
) -> ApiResult<StatusCode> {
    let revoked = state.auth.sign_out_all(&session.user_id).await?;
    info!(user_id = %session.user_id, revoked, "Signed out everywhere");
    Ok(StatusCode::OK)
}

/// Create auth routes
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/sign-in", post(sign_in))
        .route("/auth/sign-out", post(sign_out))
        .route("/auth/sign-out-all", post(sign_out_all))
}
