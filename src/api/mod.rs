//! REST API for Whispr
//!
//! Provides endpoints for:
//! - Health (`/`)
//! - Sign-in and sign-out (`/v0/auth`)
//! - Accounts and key pairs (`/v0/users`)
//! - Channels and messages (`/v0/channels`)
//! - Moderation (`/v0/admin`)
//!
//! In production everything is mounted under `/api`.

pub mod admin;
pub mod auth;
pub mod channels;
pub mod error;
pub mod health;
pub mod users;

use axum::{extract::FromRef, middleware::from_fn_with_state, Router};
use std::sync::Arc;
use whispr_core::services::TokenPolicy;
use whispr_core::{
    AdminService, AuthService, ChannelService, NotificationBus, ShutdownController, Store,
    TokenCodec, UserService,
};

use crate::middleware::auth::authorize;
use crate::server::config::RuntimeEnv;
use crate::websocket::{gateway_routes, GatewaySettings, GatewayState, SessionRegistry};

pub use admin::admin_routes;
pub use auth::auth_routes;
pub use channels::channels_routes;
pub use health::health_routes;
pub use users::users_routes;

/// Public facts about this instance
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub domain: Option<String>,
    pub port: u16,
    pub env: RuntimeEnv,
}

/// Shared state for every route
#[derive(Clone)]
pub struct AppState {
    pub users: UserService,
    pub auth: AuthService,
    pub channels: ChannelService,
    pub admin: AdminService,
    pub codec: Arc<TokenCodec>,
    pub gateway: GatewayState,
    pub info: ServerInfo,
}

impl AppState {
    /// Wire the services and the gateway around one store and one bus
    pub fn new(
        store: Store,
        codec: Arc<TokenCodec>,
        policy: TokenPolicy,
        settings: GatewaySettings,
        shutdown: Arc<ShutdownController>,
        info: ServerInfo,
    ) -> Self {
        let bus = NotificationBus::new();
        let auth = AuthService::new(store.clone(), codec.clone(), policy);

        Self {
            users: UserService::new(store.clone(), auth.clone()),
            channels: ChannelService::new(store.clone(), bus.clone()),
            admin: AdminService::new(store, codec.clone()),
            auth,
            gateway: GatewayState {
                codec: codec.clone(),
                registry: Arc::new(SessionRegistry::new()),
                bus,
                settings,
                shutdown,
            },
            codec,
            info,
        }
    }
}

impl FromRef<AppState> for GatewayState {
    fn from_ref(state: &AppState) -> Self {
        state.gateway.clone()
    }
}

/// Build the complete HTTP router
pub fn build_router(state: AppState) -> Router {
    let v0 = Router::new()
        .merge(auth_routes())
        .merge(users_routes())
        .merge(channels_routes())
        .merge(admin_routes())
        .nest("/gateway", gateway_routes())
        .layer(from_fn_with_state(state.clone(), authorize));

    let api = Router::new().merge(health_routes()).nest("/v0", v0);

    let app = if state.info.env.is_production() {
        Router::new().nest("/api", api)
    } else {
        api
    };

    app.with_state(state)
}
