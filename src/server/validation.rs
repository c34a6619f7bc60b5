//! Startup configuration validation

use super::config::{AppConfig, RuntimeEnv};
use anyhow::{bail, Result};
use tracing::warn;

/// Refuse configurations that cannot work and warn about risky ones
pub fn validate_config(config: &AppConfig, env: RuntimeEnv) -> Result<()> {
    if env.is_production() && config.server.domain.is_none() && !config.server.skip_domain_check {
        bail!(
            "Domain was not specified in a production environment. Set a domain by specifying \
             --domain example.com whilst running (replace example.com with your domain)"
        );
    }

    if !env.is_production() {
        return Ok(());
    }

    if config.server.host == "0.0.0.0" {
        warn!(
            "SECURITY WARNING: Server is binding to all interfaces (0.0.0.0) in production. \
             Consider binding to 127.0.0.1 and using a reverse proxy."
        );
    }

    if let Some(path) = config.database.file_path() {
        if path.is_relative() {
            warn!(
                path = %path.display(),
                "Database path is relative to the working directory. \
                 Consider an absolute path in production."
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_requires_domain() {
        let config = AppConfig::default();
        let err = validate_config(&config, RuntimeEnv::Production).unwrap_err();
        assert!(err.to_string().starts_with("Domain was not specified"));
    }

    #[test]
    fn test_production_domain_check_skipped() {
        let mut config = AppConfig::default();
        config.server.skip_domain_check = true;
        assert!(validate_config(&config, RuntimeEnv::Production).is_ok());
    }

    #[test]
    fn test_production_with_domain() {
        let mut config = AppConfig::default();
        config.server.domain = Some("chat.example.com".to_string());
        config.server.host = "0.0.0.0".to_string();
        assert!(validate_config(&config, RuntimeEnv::Production).is_ok());
    }

    #[test]
    fn test_development_needs_nothing() {
        assert!(validate_config(&AppConfig::default(), RuntimeEnv::Development).is_ok());
    }
}
