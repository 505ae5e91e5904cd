//! # In-Process Cluster
//!
//! Complete relay nodes (registry, store, replication, node service) that
//! talk to each other through a [`LoopbackTransport`]. Replication is driven
//! explicitly with [`Cluster::rounds`] so scenarios stay deterministic.

use std::sync::Arc;

use mr_01_registry::RegistryService;
use mr_02_mailbox_store::{InMemoryPersistence, MailboxStoreService, StoreConfig};
use mr_03_replication::{LoopbackTransport, ReplicationService, SyncConfig};
use mr_04_node_service::{NodeService, RegistryOwnerDirectory, ServiceLimits};
use shared_types::{NodeId, SystemTimeSource, TimeSource};

pub type TestReplication = ReplicationService<LoopbackTransport>;

/// One full node.
pub struct TestNode {
    pub address: String,
    pub registry: Arc<RegistryService>,
    pub store: Arc<MailboxStoreService>,
    pub replication: Arc<TestReplication>,
    pub service: Arc<NodeService>,
}

/// Nodes sharing one in-process network.
pub struct Cluster {
    pub net: Arc<LoopbackTransport>,
    pub nodes: Vec<TestNode>,
}

impl Cluster {
    /// `size` fully meshed nodes with default limits.
    pub fn new(size: usize) -> Self {
        Self::with_store_config(size, StoreConfig::default())
    }

    pub fn with_store_config(size: usize, store_config: StoreConfig) -> Self {
        let net = Arc::new(LoopbackTransport::new());
        let nodes: Vec<TestNode> = (0..size)
            .map(|i| build_node(i as u8 + 1, &net, store_config.clone()))
            .collect();

        for node in &nodes {
            for other in &nodes {
                if node.address != other.address {
                    node.replication.add_peer(&other.address);
                }
            }
        }
        Self { net, nodes }
    }

    pub fn node(&self, index: usize) -> &TestNode {
        &self.nodes[index]
    }

    /// Every online node syncs once with every known peer, `n` times over.
    pub async fn rounds(&self, n: usize) {
        for _ in 0..n {
            for node in &self.nodes {
                if self.net.is_offline(&node.address) {
                    continue;
                }
                for peer in node.replication.peer_addresses() {
                    let _ = node.replication.sync_with_peer(&peer).await;
                }
            }
        }
    }

    pub fn set_offline(&self, index: usize, offline: bool) {
        self.net.set_offline(&self.nodes[index].address, offline);
    }
}

fn build_node(id: u8, net: &Arc<LoopbackTransport>, store_config: StoreConfig) -> TestNode {
    let clock: Arc<dyn TimeSource> = Arc::new(SystemTimeSource);
    let node_id = NodeId([id; 16]);
    let address = format!("node-{}", id);

    let registry = Arc::new(RegistryService::new(node_id, Arc::clone(&clock)));
    let store = match MailboxStoreService::open(
        node_id,
        store_config,
        Arc::new(RegistryOwnerDirectory::new(registry.clone())),
        Arc::new(InMemoryPersistence::new()),
        Arc::clone(&clock),
    ) {
        Ok(store) => Arc::new(store),
        Err(e) => panic!("in-memory store failed to open: {}", e),
    };
    let replication = Arc::new(ReplicationService::new(
        node_id,
        address.clone(),
        SyncConfig::default(),
        store.clone(),
        registry.clone(),
        net.clone(),
        clock,
    ));
    net.register(address.clone(), replication.clone());

    let service = Arc::new(NodeService::new(
        node_id,
        ServiceLimits::default(),
        registry.clone(),
        store.clone(),
        replication.clone(),
    ));

    TestNode {
        address,
        registry,
        store,
        replication,
        service,
    }
}
