//! Gateway WebSocket endpoint.
//!
//! Flow:
//! 1. Client upgrades `v0/gateway/:token` with a bearer token in the path
//! 2. Server verifies the token, registers a session and sends `Hello`
//! 3. Client heartbeats at least once per interval; server acks each one
//! 4. Server events addressed to the user arrive as `Notification` frames

pub mod connection;
pub mod heartbeat;
pub mod registry;


pub use connection::handle_gateway;
pub use registry::{SessionRegistry, SocketHandle};

use axum::{
    extract::{ws::WebSocketUpgrade, Path, State},
    response::Response,
    routing::get,
    Router,
};
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use whispr_core::{NotificationBus, ShutdownController, TokenCodec};

/// Gateway tuning
#[derive(Debug, Clone, Copy)]
pub struct GatewaySettings {
    /// Heartbeat interval advertised in `Hello`; silence beyond it fails a check
    pub heartbeat_interval: Duration,
    /// Silence after which a liveness check runs
    pub heartbeat_timeout: Duration,
    /// Largest inbound message accepted by the upgrade
    pub max_message_bytes: usize,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(25_000),
            heartbeat_timeout: Duration::from_millis(60_000),
            max_message_bytes: 1_048_576,
        }
    }
}

/// Everything a gateway connection needs, built once at startup.
#[derive(Clone)]
pub struct GatewayState {
    pub codec: Arc<TokenCodec>,
    pub registry: Arc<SessionRegistry>,
    pub bus: NotificationBus,
    pub settings: GatewaySettings,
    pub shutdown: Arc<ShutdownController>,
}

/// `GET v0/gateway/:token`
pub async fn gateway_handler(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
    Path(token): Path<String>,
) -> Response {
    upgrade(ws, state, Some(token))
}

/// `GET v0/gateway`; always closes with `InvalidPayload`
pub async fn gateway_without_token(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
) -> Response {
    upgrade(ws, state, None)
}

fn upgrade(ws: WebSocketUpgrade, state: GatewayState, token: Option<String>) -> Response {
    let max = state.settings.max_message_bytes;
    ws.max_message_size(max)
        .max_frame_size(max)
        .on_upgrade(move |socket| {
            let (ws_tx, ws_rx) = socket.split();
            handle_gateway(ws_tx, ws_rx, token, state)
        })
}

/// Gateway routes, nested under `v0/gateway`
pub fn gateway_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    GatewayState: axum::extract::FromRef<S>,
{
    Router::new()
        .route("/", get(gateway_without_token))
        .route("/:token", get(gateway_handler))
}
