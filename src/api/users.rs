//! Account endpoints
//!
//! POST  /v0/users/register                          - Create an account
//! PATCH /v0/users/update-key-pair                   - Establish the caller's key pair
//! GET   /v0/users/get-user/:username                - Public profile (`@self` for the caller)
//! GET   /v0/users/get-user-by-id/:userId            - Public profile by id
//! GET   /v0/users/get-user-password-salt/:username  - Client salt for key derivation
//! GET   /v0/users/@self/channels                    - Channels the caller belongs to
//! POST  /v0/users/@self/channels                    - Open a channel with recipients

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use whispr_core::models::{Channel, PublicProfile};

use super::error::{ApiJson, ApiPath, ApiResult};
use super::AppState;
use crate::middleware::auth::RequireSession;

/// Alias for the caller in profile lookups
pub const SELF_ALIAS: &str = "@self";

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub nickname: String,
    /// `"<derived>:<clientSalt>"`
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub id: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateKeyPairRequest {
    pub encrypted_private_key: String,
    pub public_key: String,
}

#[derive(Debug, Serialize)]
pub struct PasswordSaltResponse {
    pub salt: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateChannelRequest {
    pub recipients: Vec<String>,
    #[serde(default)]
    pub name: Option<String>,
}

pub async fn register(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<RegisterResponse>)> {
    let (user, token) = state
        .users
        .register(&request.username, &request.nickname, &request.password)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse { id: user.id, token }),
    ))
}

pub async fn update_key_pair(
    State(state): State<AppState>,
    RequireSession(session): RequireSession,
    ApiJson(request): ApiJson<UpdateKeyPairRequest>,
) -> ApiResult<StatusCode> {
    state
        .users
        .set_key_pair(
            &session.user_id,
            &request.encrypted_private_key,
            &request.public_key,
        )
        .await?;
    Ok(StatusCode::OK)
}

pub async fn get_user(
    State(state): State<AppState>,
    RequireSession(session): RequireSession,
    ApiPath(username): ApiPath<String>,
) -> ApiResult<Json<PublicProfile>> {
    let user = if username == SELF_ALIAS {
        state.users.get_by_id(&session.user_id).await?
    } else {
        state.users.get_by_username(&username).await?
    };
    Ok(Json(state.users.profile(&user, &session.user_id).await?))
}

pub async fn get_user_by_id(
    State(state): State<AppState>,
    RequireSession(session): RequireSession,
    ApiPath(user_id): ApiPath<String>,
) -> ApiResult<Json<PublicProfile>> {
    let user = state.users.get_by_id(&user_id).await?;
    Ok(Json(state.users.profile(&user, &session.user_id).await?))
}

pub async fn get_password_salt(
    State(state): State<AppState>,
    ApiPath(username): ApiPath<String>,
) -> ApiResult<Json<PasswordSaltResponse>> {
    let salt = state.users.password_salt(&username).await?;
    Ok(Json(PasswordSaltResponse { salt }))
}

pub async fn list_channels(
    State(state): State<AppState>,
    RequireSession(session): RequireSession,
) -> ApiResult<Json<Vec<Channel>>> {
    Ok(Json(state.channels.list_for_user(&session.user_id).await?))
}

pub async fn create_channel(
    State(state): State<AppState>,
    RequireSession(session): RequireSession,
    ApiJson(request): ApiJson<CreateChannelRequest>,
) -> ApiResult<(StatusCode, Json<Channel>)> {
    let channel = state
        .channels
        .create(&session.user_id, &request.recipients, request.name.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(channel)))
}

/// Create user routes
pub fn users_routes() -> Router<AppState> {
    Router::new()
        .route("/users/register", post(register))
        .route("/users/update-key-pair", patch(update_key_pair))
        .route("/users/get-user/:username", get(get_user))
        .route("/users/get-user-by-id/:user_id", get(get_user_by_id))
        .route(
            "/users/get-user-password-salt/:username",
            get(get_password_salt),
        )
        .route(
            "/users/@self/channels",
            get(list_channels).post(create_channel),
        )
}

#[cfg(test)]
mod tests;
