//! CLI module for Whispr
//!
//! `whispr [serve] [--host H] [--port P] [--domain D] [--skip-domain-check]`
//!
//! Running without a subcommand starts the server.

use clap::{Args, Parser, Subcommand};

use crate::server::config::AppConfig;

/// Whispr encrypted messaging server
#[derive(Parser, Debug)]
#[command(name = "whispr")]
#[command(about = "Encrypted messaging server")]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub serve: ServeArgs,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the server (default)
    Serve(ServeArgs),
}

/// Overrides applied on top of the loaded configuration
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct ServeArgs {
    /// Address to bind
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short = 'P', long)]
    pub port: Option<u16>,

    /// Public domain this instance is served from
    #[arg(short = 'D', long)]
    pub domain: Option<String>,

    /// Do not probe the public address after startup
    #[arg(long)]
    pub skip_domain_check: bool,
}

impl ServeArgs {
    /// Apply the flags that were given
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(domain) = &self.domain {
            config.server.domain = Some(domain.clone());
        }
        if self.skip_domain_check {
            config.server.skip_domain_check = true;
        }
    }
}

/// Run the CLI command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let args = match cli.command {
        Some(Commands::Serve(args)) => args,
        None => cli.serve,
    };
    crate::server::run(args).await
}
