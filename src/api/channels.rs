//! Channel and message endpoints
//!
//! GET    /v0/channels/:channelId                        - Channel details
//! GET    /v0/channels/:channelId/messages?page=N        - One page of messages, newest first
//! POST   /v0/channels/:channelId/messages               - Post a message
//! GET    /v0/channels/:channelId/messages/:messageId    - One message
//! PATCH  /v0/channels/:channelId/messages/:messageId    - Replace a message's ciphertexts
//! DELETE /v0/channels/:channelId/messages/:messageId    - Delete a message

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use whispr_core::models::{Channel, MessageContent, MessageView};

use super::error::{ApiJson, ApiPath, ApiQuery, ApiResult};
use super::AppState;
use crate::middleware::auth::RequireSession;

#[derive(Debug, Default, Deserialize)]
pub struct MessagesQuery {
    /// 1-based page number
    pub page: Option<i64>,
}

/// Message body: one ciphertext per recipient
#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub content: Vec<MessageContent>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageCreated {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageUpdated {
    pub id: String,
    pub updated_at: Option<DateTime<Utc>>,
}

pub async fn get_channel(
    State(state): State<AppState>,
    RequireSession(session): RequireSession,
    ApiPath(channel_id): ApiPath<String>,
) -> ApiResult<Json<Channel>> {
    Ok(Json(state.channels.get(&channel_id, &session.user_id).await?))
}

pub async fn list_messages(
    State(state): State<AppState>,
    RequireSession(session): RequireSession,
    ApiPath(channel_id): ApiPath<String>,
    ApiQuery(query): ApiQuery<MessagesQuery>,
) -> ApiResult<Json<Vec<MessageView>>> {
    let messages = state
        .channels
        .messages(&channel_id, &session.user_id, query.page.unwrap_or(1))
        .await?;
    Ok(Json(messages))
}

pub async fn get_message(
    State(state): State<AppState>,
    RequireSession(session): RequireSession,
    ApiPath((channel_id, message_id)): ApiPath<(String, String)>,
) -> ApiResult<Json<MessageView>> {
    let message = state
        .channels
        .message(&channel_id, &message_id, &session.user_id)
        .await?;
    Ok(Json(message))
}

pub async fn post_message(
    State(state): State<AppState>,
    RequireSession(session): RequireSession,
    ApiPath(channel_id): ApiPath<String>,
    ApiJson(request): ApiJson<MessageRequest>,
) -> ApiResult<(StatusCode, Json<MessageCreated>)> {
    let message = state
        .channels
        .post_message(&channel_id, &session.user_id, &request.content)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageCreated {
            id: message.id,
            created_at: message.created_at,
        }),
    ))
}

pub async fn update_message(
    State(state): State<AppState>,
    RequireSession(session): RequireSession,
    ApiPath((channel_id, message_id)): ApiPath<(String, String)>,
    ApiJson(request): ApiJson<MessageRequest>,
) -> ApiResult<Json<MessageUpdated>> {
    let message = state
        .channels
        .update_message(&channel_id, &message_id, &session.user_id, &request.content)
        .await?;
    Ok(Json(MessageUpdated {
        id: message.id,
        updated_at: message.edited_at,
    }))
}

pub async fn delete_message(
    State(state): State<AppState>,
    RequireSession(session): RequireSession,
    ApiPath((channel_id, message_id)): ApiPath<(String, String)>,
) -> ApiResult<StatusCode> {
    state
        .channels
        .delete_message(&channel_id, &message_id, &session.user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Create channel routes
pub fn channels_routes() -> Router<AppState> {
    Router::new()
        .route("/channels/:channel_id", get(get_channel))
        .route(
            "/channels/:channel_id/messages",
            get(list_messages).post(post_message),
        )
        .route(
            "/channels/:channel_id/messages/:message_id",
            get(get_message).patch(update_message).delete(delete_message),
        )
}
