//! Health endpoint
//!
//! `GET /` reports liveness plus enough about the instance for clients to
//! confirm they reached the server they expected (also used by the domain
//! self-check at startup).

use axum::{extract::State, response::Json, routing::get, Router};
use serde::Serialize;

use super::AppState;

/// Build commit, stamped by the release pipeline
const COMMIT_HASH: Option<&str> = option_env!("WHISPR_COMMIT_HASH");

/// Health response
#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct HealthResponse {
    pub is_alive: bool,
    pub domain: Option<String>,
    pub port: u16,
    pub env: &'static str,
    pub version: &'static str,
    pub commit_hash: &'static str,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        is_alive: true,
        domain: state.info.domain.clone(),
        port: state.info.port,
        env: state.info.env.as_str(),
        version: env!("CARGO_PKG_VERSION"),
        commit_hash: COMMIT_HASH.unwrap_or("unknown"),
    })
}

/// Create health routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/", get(health_check))
}
