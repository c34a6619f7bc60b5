//! Server configuration types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use whispr_core::services::TokenPolicy;

use crate::websocket::GatewaySettings;

/// Environment variable selecting the runtime environment
pub const ENV_VAR: &str = "WHISPR_ENV";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Public domain this instance serves; required in production
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub skip_domain_check: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 28980,
            domain: None,
            skip_domain_check: false,
        }
    }
}

/// SQLite database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:data/whispr.db?mode=rwc".to_string(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseConfig {
    /// Filesystem path of the database, if the URL names one
    pub fn file_path(&self) -> Option<PathBuf> {
        let rest = self
            .url
            .strip_prefix("sqlite://")
            .or_else(|| self.url.strip_prefix("sqlite:"))?;
        let path = rest.split('?').next().unwrap_or_default();
        if path.is_empty() || path == ":memory:" {
            return None;
        }
        Some(PathBuf::from(path))
    }
}

/// Token issuance configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_issuer")]
    pub issuer: String,
    #[serde(default = "default_token_ttl_secs")]
    pub access_token_ttl_secs: u64,
    #[serde(default = "default_token_ttl_secs")]
    pub refresh_token_ttl_secs: u64,
    #[serde(default = "default_token_ttl_secs")]
    pub settings_token_ttl_secs: u64,
    /// Audience used when no domain is configured
    #[serde(default = "default_audience")]
    pub audience: String,
}

fn default_issuer() -> String {
    "Whispr".to_string()
}

fn default_token_ttl_secs() -> u64 {
    90 * 24 * 60 * 60
}

fn default_audience() -> String {
    "localhost".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: default_issuer(),
            access_token_ttl_secs: default_token_ttl_secs(),
            refresh_token_ttl_secs: default_token_ttl_secs(),
            settings_token_ttl_secs: default_token_ttl_secs(),
            audience: default_audience(),
        }
    }
}

/// Gateway connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

fn default_heartbeat_interval_ms() -> u64 {
    25_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    60_000
}

fn default_max_message_bytes() -> usize {
    1024 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            max_message_bytes: default_max_message_bytes(),
        }
    }
}

impl AppConfig {
    /// Token lifetimes and audience for user tokens
    pub fn token_policy(&self) -> TokenPolicy {
        let millis = |secs: u64| i64::try_from(secs.saturating_mul(1000)).unwrap_or(i64::MAX);
        TokenPolicy {
            audience: self
                .server
                .domain
                .clone()
                .unwrap_or_else(|| self.auth.audience.clone()),
            access_ttl_millis: millis(self.auth.access_token_ttl_secs),
            refresh_ttl_millis: millis(self.auth.refresh_token_ttl_secs),
            settings_ttl_millis: millis(self.auth.settings_token_ttl_secs),
        }
    }

    /// Gateway timing and size limits
    pub fn gateway_settings(&self) -> GatewaySettings {
        GatewaySettings {
            heartbeat_interval: Duration::from_millis(self.gateway.heartbeat_interval_ms),
            heartbeat_timeout: Duration::from_millis(self.gateway.heartbeat_timeout_ms),
            max_message_bytes: self.gateway.max_message_bytes,
        }
    }
}

/// Runtime environment, selected by `WHISPR_ENV`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeEnv {
    Development,
    Production,
}

impl RuntimeEnv {
    /// Read the environment from `WHISPR_ENV`
    pub fn from_env() -> Self {
        Self::parse(std::env::var(ENV_VAR).ok().as_deref())
    }

    fn parse(value: Option<&str>) -> Self {
        match value.map(str::to_lowercase).as_deref() {
            Some("production") | Some("prod") => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(self) -> bool {
        self == Self::Production
    }

    /// Short name reported by the health endpoint
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "dev",
            Self::Production => "prod",
        }
    }
}
