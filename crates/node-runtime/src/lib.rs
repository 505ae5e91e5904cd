//! # Mailbox Relay Node Runtime
//!
//! Builds a relay node from [`NodeConfig`], serves its HTTP surface and runs
//! its background tasks until shutdown.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (defaults → `MR_CONFIG` file → `MR_*` variables)
//! 2. Initialize logging
//! 3. Validate configuration
//! 4. Build subsystems in dependency order ([`SubsystemContainer`])
//! 5. Spawn replication (one task per peer), the registry snapshot timer and
//!    the mailbox compaction timer
//! 6. Serve HTTP until shutdown, then flush the registry snapshot
//!
//! ## Modular Structure
//!
//! - `container/` - configuration and subsystem wiring
//! - `adapters/` - HTTP peer transport, registry snapshot file, data-dir lock
//! - `telemetry` - tracing subscriber setup

pub mod adapters;
pub mod container;
pub mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use mr_02_mailbox_store::MailboxStoreApi;
use mr_04_node_service::build_router;

pub use container::{NodeConfig, SubsystemContainer};

/// A running relay node.
pub struct NodeRuntime {
    container: Arc<SubsystemContainer>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl NodeRuntime {
    /// Build every subsystem. Nothing runs until [`NodeRuntime::serve`].
    pub fn new(config: NodeConfig) -> Result<Self> {
        config.validate().context("invalid configuration")?;
        let container = Arc::new(SubsystemContainer::new(config)?);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Ok(Self {
            container,
            shutdown_tx,
            shutdown_rx,
        })
    }

    pub fn container(&self) -> &Arc<SubsystemContainer> {
        &self.container
    }

    /// The HTTP router of this node.
    pub fn router(&self) -> Router {
        build_router(Arc::clone(&self.container.service))
    }

    /// Run background tasks and serve `listener` until [`NodeRuntime::shutdown`].
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let local_addr = listener.local_addr().context("listener has no address")?;
        info!(
            addr = %local_addr,
            node_id = %self.container.node_id,
            "Mailbox relay node listening"
        );

        let replication = tokio::spawn(
            Arc::clone(&self.container.replication).run(self.shutdown_rx.clone()),
        );
        let snapshots = self.spawn_snapshot_timer();
        let compaction = self.spawn_compaction_timer();

        let mut shutdown = self.shutdown_rx.clone();
        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|stop| *stop).await;
            })
            .await
            .context("HTTP server failed");

        // A server error must still stop the background tasks.
        self.shutdown();
        let _ = replication.await;
        let _ = compaction.await;
        if let Some(task) = snapshots {
            let _ = task.await;
        }
        self.container.save_registry();
        info!("Mailbox relay node stopped");
        served
    }

    /// Ask every task to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    fn spawn_compaction_timer(&self) -> tokio::task::JoinHandle<()> {
        let container = Arc::clone(&self.container);
        let period = Duration::from_millis(container.config.mailbox.store.compaction_interval_ms);
        let mut shutdown = self.shutdown_rx.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let store = Arc::clone(&container.store);
                        match tokio::task::spawn_blocking(move || store.compact()).await {
                            Ok(Ok(dropped)) => debug!(dropped, "Compaction tick"),
                            Ok(Err(e)) => warn!(error = %e, "Mailbox compaction failed"),
                            Err(e) => warn!(error = %e, "Mailbox compaction task panicked"),
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }

    fn spawn_snapshot_timer(&self) -> Option<tokio::task::JoinHandle<()>> {
        self.container.registry_snapshot.as_ref()?;
        let container = Arc::clone(&self.container);
        let period = Duration::from_millis(container.config.storage.registry_snapshot_interval_ms);
        let mut shutdown = self.shutdown_rx.clone();

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let container = Arc::clone(&container);
                        let _ = tokio::task::spawn_blocking(move || container.save_registry()).await;
                        debug!("Registry snapshot tick");
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        }))
    }
}
