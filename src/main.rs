//! edge-proxy binary.
//!
//! ```text
//! edge-proxy --config proxy.toml
//!     → load + validate static config
//!     → logging
//!     → Proxy::start (watcher, health monitor, providers, entry points, admin API)
//!     → wait for SIGINT/SIGTERM → shutdown → drain
//! ```

use std::path::PathBuf;

use clap::Parser;

use edge_proxy::config::loader::load_config;
use edge_proxy::config::ProxyConfig;
use edge_proxy::lifecycle::{wait_for_signal, Proxy, Shutdown};
use edge_proxy::observability::logging;

#[derive(Parser, Debug)]
#[command(name = "edge-proxy", version, about = "Edge reverse proxy")]
struct Cli {
    /// Static configuration file (TOML). Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "edge-proxy starting");

    let shutdown = Shutdown::new();
    let proxy = Proxy::start(config, &shutdown).await?;

    wait_for_signal().await;
    tracing::info!("Shutting down");
    shutdown.trigger();
    proxy.wait().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
