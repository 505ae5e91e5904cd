//! `mailbox-relay` node executable.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use node_runtime::telemetry::init_logging;
use node_runtime::{NodeConfig, NodeRuntime};

#[tokio::main]
async fn main() -> Result<()> {
    let config = NodeConfig::load().context("failed to load configuration")?;
    init_logging(&config.logging).context("failed to initialize logging")?;

    let listen_addr = config.network.listen_addr;
    let runtime = Arc::new(NodeRuntime::new(config)?);
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", listen_addr))?;

    let signal_runtime = Arc::clone(&runtime);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested"),
            Err(e) => error!(error = %e, "Failed to listen for Ctrl+C, shutting down"),
        }
        signal_runtime.shutdown();
    });

    runtime.serve(listener).await
}
