//! # Parley Server
//!
//! Real-time presence and message routing server.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! parley
//!
//! # Run with custom config
//! parley --config /path/to/parley.toml
//!
//! # Override the listen address
//! parley --addr 0.0.0.0:4042
//!
//! # Run with environment variables
//! PARLEY_PORT=8080 PARLEY_HOST=0.0.0.0 parley
//! ```

mod config;
mod handlers;
mod metrics;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments.
#[derive(Debug, Parser)]
#[command(name = "parley", version, about = "Real-time presence and message routing server")]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address (host:port), overrides the config file
    #[arg(short, long)]
    addr: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,parley_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => config::Config::from_file(path)?,
        None => config::Config::load()?,
    };
    if let Some(addr) = &args.addr {
        config.set_addr(addr)?;
    }

    tracing::info!("Starting Parley server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from(["parley", "--config", "parley.toml", "--addr", "0.0.0.0:9000"]);
        assert_eq!(args.config, Some(PathBuf::from("parley.toml")));
        assert_eq!(args.addr.as_deref(), Some("0.0.0.0:9000"));
    }
}
