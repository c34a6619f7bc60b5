//! Moderation endpoints (admin only)
//!
//! GET  /v0/admin/is-authorised        - 200 when the caller is an admin
//! POST /v0/admin/ban-user/:username   - Ban, revoke tokens, drop live sessions
//! POST /v0/admin/unban-user/:username - Lift a ban

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Router,
};
use tracing::info;

use super::error::{ApiPath, ApiResult};
use super::AppState;
use crate::middleware::auth::RequireSession;
use crate::websocket::protocol::GatewayCloseCode;

pub async fn is_authorised(
    State(state): State<AppState>,
    RequireSession(session): RequireSession,
) -> ApiResult<StatusCode> {
    state.admin.require_admin(&session.user_id).await?;
    Ok(StatusCode::OK)
}

pub async fn ban_user(
    State(state): State<AppState>,
    RequireSession(session): RequireSession,
    ApiPath(username): ApiPath<String>,
) -> ApiResult<StatusCode> {
    state.admin.require_admin(&session.user_id).await?;
    let user_id = state.admin.ban(&username).await?;

    let closed = state.gateway.registry.disconnect_user(
        &user_id,
        GatewayCloseCode::NotAuthenticated,
        "User banned",
    );
    info!(user_id = %user_id, closed, by = %session.user_id, "Banned user disconnected");
    Ok(StatusCode::OK)
}

pub async fn unban_user(
    State(state): State<AppState>,
    RequireSession(session): RequireSession,
    ApiPath(username): ApiPath<String>,
) -> ApiResult<StatusCode> {
    state.admin.require_admin(&session.user_id).await?;
    state.admin.unban(&username).await?;
    Ok(StatusCode::OK)
}

/// Create admin routes
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/is-authorised", get(is_authorised))
        .route("/admin/ban-user/:username", post(ban_user))
        .route("/admin/unban-user/:username", post(unban_user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{register, test_state_with_store};
    use crate::server::config::RuntimeEnv;
    use crate::websocket::SessionRegistry;
    use whispr_core::models::Role;

    #[tokio::test]
    async fn test_non_admin_is_rejected() {
        let (state, _) = test_state_with_store(RuntimeEnv::Development).await;
        let (_, session) = register(&state, "alice").await;

        let err = is_authorised(State(state), session).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.message(), "User is not an admin");
    }

    #[tokio::test]
    async fn test_ban_revokes_tokens_and_closes_sessions() {
        let (state, store) = test_state_with_store(RuntimeEnv::Development).await;
        let (admin, admin_session) = register(&state, "admin").await;
        store.set_user_role(&admin.id, Role::Admin).await.unwrap();
        let (mallory, mallory_session) = register(&state, "mallory").await;

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let handle = crate::websocket::gateway::SocketHandle::new(tx);
        let registry: &SessionRegistry = &state.gateway.registry;
        registry
            .register(uuid::Uuid::new_v4(), mallory.id.clone(), handle)
            .unwrap();

        let again = RequireSession(admin_session.0.clone());
        assert_eq!(
            is_authorised(State(state.clone()), admin_session).await.unwrap(),
            StatusCode::OK
        );
        ban_user(State(state.clone()), again, ApiPath("mallory".to_string()))
            .await
            .unwrap();

        assert!(state.codec.verify(&mallory_session.0.token).await.is_err());
        // Close notice, then the close frame
        assert!(rx.recv().await.is_some());
        assert!(matches!(
            rx.recv().await,
            Some(axum::extract::ws::Message::Close(Some(frame))) if frame.code == 4002
        ));

        let err = state
            .auth
            .sign_in("mallory", "derived:client-salt")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "User is banned");
    }
}
