//! Branch network monitoring HTTP server.
//!
//! Serves the read-API contract over the current-state store and, when it
//! wins leader election, drives the six scheduled sweeps (ping, SNMP
//! discovery, SNMP metrics, alert evaluation, time-series flush, retention).

mod background;
mod error;
mod handlers;
mod server;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use unet_core::config::Config;
#[cfg(not(test))]
use unet_core::logging::init_tracing;

/// Branch network monitoring server.
#[derive(Parser, Debug)]
#[command(name = "unet-server")]
#[command(about = "HTTP read API and sweep scheduler for the branch monitoring engine")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Server port to bind to
    #[arg(short, long)]
    port: Option<u16>,

    /// Database URL
    #[arg(short, long, default_value = "sqlite://monitoring.db?mode=rwc")]
    database_url: String,

    /// `tracing_subscriber::EnvFilter` directive (e.g. "info" or "debug,unet_core=trace")
    #[arg(long)]
    log_filter: Option<String>,
}

const DEFAULT_DATABASE_URL: &str = "sqlite://monitoring.db?mode=rwc";

/// Load configuration from file or environment with fallback to defaults
fn load_configuration(args: &Args) -> Result<Config> {
    if let Some(config_path) = &args.config {
        info!("Loading configuration from: {}", config_path.display());
        Ok(Config::from_file(config_path.clone())?)
    } else {
        Ok(Config::from_env().unwrap_or_else(|_| {
            info!("Using default configuration");
            Config::default()
        }))
    }
}

/// Apply command line argument overrides to configuration
fn apply_cli_overrides(config: &mut Config, args: &Args) {
    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(log_filter) = &args.log_filter {
        config.logging.filter = log_filter.clone();
    }
}

/// Determine the database URL to use (CLI override or config)
fn determine_database_url(args: &Args, config: &Config) -> String {
    if args.database_url == DEFAULT_DATABASE_URL {
        config.database_url()
    } else {
        args.database_url.clone()
    }
}

/// Initialize the application with given arguments
async fn initialize_app(args: Args) -> Result<(Config, String)> {
    let mut config = load_configuration(&args)?;
    apply_cli_overrides(&mut config, &args);
    let database_url = determine_database_url(&args, &config);
    config.validate()?;

    #[cfg(not(test))]
    init_tracing(&config.logging)?;

    info!("starting branch monitoring server");
    info!(
        "configuration: server={}:{}, database_url={}",
        config.server.host, config.server.port, database_url
    );

    Ok((config, database_url))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let (config, database_url) = initialize_app(args).await?;
    server::run(config, database_url).await
}
