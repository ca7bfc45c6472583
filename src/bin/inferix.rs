//! # inferix gateway
//!
//! Loads the gateway configuration, builds the broker and serves the
//! OpenAI/TEI-compatible API until Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use inferix::{server, Broker, GatewayConfig};

/// OpenAI compatible gateway for building Generative AI applications
#[derive(Parser)]
#[command(name = "inferix")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, env = "INFERIX_CONFIG", default_value = "inferix.yaml", value_name = "FILE")]
    config: PathBuf,

    /// Address to listen on
    #[arg(long, env = "INFERIX_ADDR", default_value = "0.0.0.0:4386")]
    addr: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("inferix=info")),
        )
        .init();

    let cli = Cli::parse();

    let config = GatewayConfig::from_path(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let broker = Broker::from_config(&config).context("building broker")?;

    let listener = TcpListener::bind(cli.addr)
        .await
        .with_context(|| format!("binding {}", cli.addr))?;
    info!(addr = %cli.addr, config = %cli.config.display(), "inferix listening");

    server::serve(listener, broker, shutdown_signal()).await?;
    info!("inferix stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(e) => {
            // No signal handler; serve until the process is killed.
            warn!(error = %e, "unable to listen for ctrl-c");
            std::future::pending::<()>().await
        }
    }
}
