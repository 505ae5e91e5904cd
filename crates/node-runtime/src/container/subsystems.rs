//! # Subsystem Container
//!
//! Builds every subsystem of one node and wires them together.
//!
//! ## Initialization Order
//!
//! ```text
//! Level 0: Data-dir lock (file backend), node identity, clock
//! Level 1: Registry (mr-01)            ← registry snapshot (file backend)
//! Level 2: Mailbox Store (mr-02)       ← owner lookups from the registry
//!                                      ← record-file replay (file backend)
//! Level 3: Replication (mr-03)         → HttpPeerTransport, initial peers
//! Level 4: Node Service (mr-04)        → HTTP router
//! ```
//!
//! ## Thread Safety
//!
//! All subsystems are `Arc`-shared and internally synchronized; the
//! container itself is immutable after construction.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use mr_01_registry::{RegistryApi, RegistryService};
use mr_02_mailbox_store::{
    FileBackedPersistence, InMemoryPersistence, MailboxPersistence, MailboxStoreService,
};
use mr_03_replication::ReplicationService;
use mr_04_node_service::{NodeService, RegistryOwnerDirectory};
use shared_types::{NodeId, SystemTimeSource, TimeSource};

use crate::adapters::{DataDirLock, HttpPeerTransport, RegistrySnapshot};
use crate::container::config::{NodeConfig, StorageBackend};

/// Replication over HTTP, as run by the executable.
pub type NodeReplication = ReplicationService<HttpPeerTransport>;

/// Central container holding all subsystem instances.
pub struct SubsystemContainer {
    pub config: NodeConfig,
    pub node_id: NodeId,

    // =========================================================================
    // LEVEL 1-2: State
    // =========================================================================
    pub registry: Arc<RegistryService>,
    pub store: Arc<MailboxStoreService>,

    // =========================================================================
    // LEVEL 3-4: Network-facing
    // =========================================================================
    pub replication: Arc<NodeReplication>,
    pub service: Arc<NodeService>,

    /// Present with the file backend.
    pub registry_snapshot: Option<RegistrySnapshot>,
    /// Held until the container is dropped (file backend).
    data_dir_lock: Option<DataDirLock>,
}

impl SubsystemContainer {
    /// Build and wire every subsystem.
    #[instrument(skip_all, fields(backend = ?config.storage.backend))]
    pub fn new(config: NodeConfig) -> Result<Self> {
        let data_dir_lock = match config.storage.backend {
            StorageBackend::Memory => None,
            StorageBackend::File => Some(
                DataDirLock::acquire(&config.storage.data_dir).with_context(|| {
                    format!("failed to lock {}", config.storage.data_dir.display())
                })?,
            ),
        };
        let clock: Arc<dyn TimeSource> = Arc::new(SystemTimeSource);
        let node_id = resolve_node_id(&config)?;
        info!(node_id = %node_id, "Initializing subsystems");

        // Level 1: Registry
        let registry = Arc::new(RegistryService::new(node_id, Arc::clone(&clock)));
        let registry_snapshot = match config.storage.backend {
            StorageBackend::Memory => None,
            StorageBackend::File => {
                let snapshot = RegistrySnapshot::new(config.storage.registry_snapshot_path());
                snapshot
                    .load_into(registry.as_ref())
                    .with_context(|| {
                        format!("failed to load {}", snapshot.path().display())
                    })?;
                Some(snapshot)
            }
        };
        let registry_api: Arc<dyn RegistryApi> = registry.clone();

        // Level 2: Mailbox Store
        let persistence: Arc<dyn MailboxPersistence> = match config.storage.backend {
            StorageBackend::Memory => Arc::new(InMemoryPersistence::new()),
            StorageBackend::File => {
                let path = config.storage.mailbox_log_path();
                Arc::new(
                    FileBackedPersistence::open(&path)
                        .with_context(|| format!("failed to open {}", path.display()))?,
                )
            }
        };
        let store = Arc::new(
            MailboxStoreService::open(
                node_id,
                config.mailbox.store.clone(),
                Arc::new(RegistryOwnerDirectory::new(registry_api.clone())),
                persistence,
                Arc::clone(&clock),
            )
            .context("failed to open mailbox store")?,
        );

        // Level 3: Replication
        let transport = HttpPeerTransport::new(Duration::from_millis(
            config.network.peer_request_timeout_ms,
        ))
        .context("failed to build peer transport")?;
        let replication = Arc::new(ReplicationService::new(
            node_id,
            config.advertise_url(),
            config.replication.clone(),
            store.clone(),
            registry_api.clone(),
            Arc::new(transport),
            clock,
        ));
        for peer in &config.network.peers {
            if !replication.add_peer(peer) {
                warn!(peer = %peer, "Skipping configured peer");
            }
        }

        // Level 4: Node Service
        let service = Arc::new(NodeService::new(
            node_id,
            config.mailbox.limits.clone(),
            registry_api,
            store.clone(),
            replication.clone(),
        ));

        info!(
            node_id = %node_id,
            advertise_url = %config.advertise_url(),
            peers = config.network.peers.len(),
            "Subsystems initialized"
        );

        Ok(Self {
            config,
            node_id,
            registry,
            store,
            replication,
            service,
            registry_snapshot,
            data_dir_lock,
        })
    }

    /// Whether this container holds the data-dir lock.
    pub fn holds_data_dir_lock(&self) -> bool {
        self.data_dir_lock.is_some()
    }

    /// Write the registry snapshot, if this node keeps one.
    pub fn save_registry(&self) {
        let Some(snapshot) = &self.registry_snapshot else {
            return;
        };
        if let Err(e) = snapshot.save(self.registry.as_ref()) {
            warn!(error = %e, path = %snapshot.path().display(), "Registry snapshot failed");
        }
    }
}

/// Configured id, else the id stored under `data_dir` (file backend), else a
/// fresh one.
fn resolve_node_id(config: &NodeConfig) -> Result<NodeId> {
    if let Some(id) = &config.network.node_id {
        return NodeId::parse(id).context("invalid network.node_id");
    }
    if config.storage.backend == StorageBackend::Memory {
        return Ok(NodeId::random());
    }

    let path = config.storage.node_id_path();
    match std::fs::read_to_string(&path) {
        Ok(text) => NodeId::parse(text.trim())
            .with_context(|| format!("invalid node id in {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let id = NodeId::random();
            std::fs::create_dir_all(&config.storage.data_dir)
                .with_context(|| format!("failed to create {}", config.storage.data_dir.display()))?;
            std::fs::write(&path, id.to_string())
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(node_id = %id, path = %path.display(), "Generated node id");
            Ok(id)
        }
        Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
    }
}
