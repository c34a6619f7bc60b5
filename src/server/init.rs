//! Server initialization and main run loop
//!
//! Contains the main `run()` function that starts all server components.

use super::background_tasks::{domain_check_target, start_domain_check};
use super::config::RuntimeEnv;
use super::loader::load_config;
use super::validation::validate_config;
use crate::api::{build_router, AppState, ServerInfo};
use crate::cli::ServeArgs;
use crate::websocket::protocol::GatewayCloseCode;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use whispr_core::{shutdown_signal_with_controller, ShutdownController, Store, TokenCodec};

/// Run the server
pub async fn run(args: ServeArgs) -> Result<()> {
    info!("Starting Whispr v{}", env!("CARGO_PKG_VERSION"));

    let mut config = load_config().context("Failed to load configuration")?;
    args.apply(&mut config);
    info!("Configuration loaded");

    let env = RuntimeEnv::from_env();
    validate_config(&config, env)?;

    if let Some(path) = config.database.file_path() {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory {}", parent.display())
            })?;
        }
    }

    let store = Store::connect(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to open database")?;
    info!("Database ready");

    let codec = Arc::new(TokenCodec::new(Arc::new(store.clone()), config.auth.issuer.clone()));
    let shutdown_controller = ShutdownController::new();

    let state = AppState::new(
        store.clone(),
        codec,
        config.token_policy(),
        config.gateway_settings(),
        shutdown_controller.clone(),
        ServerInfo {
            domain: config.server.domain.clone(),
            port: config.server.port,
            env,
        },
    );
    let registry = state.gateway.registry.clone();

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    match (env, &config.server.domain) {
        (RuntimeEnv::Production, Some(domain)) => info!(
            "Server is listening on https://{}/api (internal port: {})",
            domain, config.server.port
        ),
        _ => info!("Server is listening on http://{}", addr),
    }

    if let Some((url, domain)) = domain_check_target(&config, env) {
        start_domain_check(url, domain, shutdown_controller.clone());
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_controller(shutdown_controller))
        .await
        .context("HTTP server error")?;

    // Connections that outlived the drain timeout
    let stragglers = registry.close_all(GatewayCloseCode::UnknownError, "Server shutting down");
    if stragglers > 0 {
        info!(stragglers, "Closed remaining gateway sessions");
    }

    store.close().await;
    info!("Whispr shutdown complete");
    Ok(())
}
