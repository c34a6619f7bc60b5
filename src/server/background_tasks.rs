//! Background tasks started alongside the HTTP server

use super::config::{AppConfig, RuntimeEnv};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};
use whispr_core::ShutdownController;

const DOMAIN_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// URL and display name the domain self-check probes, if it should run
pub fn domain_check_target(config: &AppConfig, env: RuntimeEnv) -> Option<(String, String)> {
    if config.server.skip_domain_check {
        return None;
    }
    match env {
        RuntimeEnv::Production => {
            let domain = config.server.domain.as_ref()?;
            Some((format!("https://{}/api", domain), domain.clone()))
        }
        RuntimeEnv::Development => Some((
            format!("http://localhost:{}", config.server.port),
            "localhost".to_string(),
        )),
    }
}

/// Check that the server answers on its public address.
///
/// A failed check asks the server to shut down.
pub fn start_domain_check(
    url: String,
    domain: String,
    shutdown: Arc<ShutdownController>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match check_domain(&url).await {
            Ok(()) => info!(url = %url, "Domain check passed"),
            Err(e) => {
                error!(
                    url = %url,
                    error = %e,
                    "Domain check failed validity test. Is {} pointing to this server instance?",
                    domain
                );
                shutdown.request_shutdown();
            }
        }
    })
}

async fn check_domain(url: &str) -> anyhow::Result<()> {
    let client = reqwest::Client::builder()
        .timeout(DOMAIN_CHECK_TIMEOUT)
        .build()?;
    let response = client.get(url).send().await?;
    if response.status() != reqwest::StatusCode::OK {
        anyhow::bail!("unexpected status {}", response.status());
    }
    Ok(())
}
