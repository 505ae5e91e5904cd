//! # Outbound Ports
//!
//! The client side of the peer protocol.
//!
//! Production: `HttpPeerTransport` (node-runtime, reqwest)
//! Testing: `LoopbackTransport` (below)

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;

use mr_01_registry::RegistryChanges;
use shared_types::RelayError;

use crate::domain::{AdvertiseAck, Advertisement, PullRequest, PullResponse};
use crate::ports::inbound::PeerSyncApi;

/// Calls to a remote peer.
///
/// Failures are `PeerUnreachable` or `Timeout`; they never leave the
/// replication crate.
#[async_trait]
pub trait PeerTransport: Send + Sync + 'static {
    async fn advertise(
        &self,
        peer: &str,
        advertisement: Advertisement,
    ) -> Result<AdvertiseAck, RelayError>;

    async fn pull_since(&self, peer: &str, request: PullRequest)
        -> Result<PullResponse, RelayError>;

    async fn pull_registry(
        &self,
        peer: &str,
        since: u64,
        limit: usize,
    ) -> Result<RegistryChanges, RelayError>;
}

/// In-process transport connecting nodes by address.
///
/// Nodes can be taken offline to exercise failure handling.
#[derive(Default)]
pub struct LoopbackTransport {
    endpoints: DashMap<String, Arc<dyn PeerSyncApi>>,
    offline: RwLock<HashSet<String>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, address: impl Into<String>, endpoint: Arc<dyn PeerSyncApi>) {
        self.endpoints.insert(address.into(), endpoint);
    }

    pub fn set_offline(&self, address: &str, offline: bool) {
        let mut set = self.offline.write();
        if offline {
            set.insert(address.to_string());
        } else {
            set.remove(address);
        }
    }

    pub fn is_offline(&self, address: &str) -> bool {
        self.offline.read().contains(address)
    }

    fn endpoint(&self, peer: &str) -> Result<Arc<dyn PeerSyncApi>, RelayError> {
        if self.is_offline(peer) {
            return Err(RelayError::PeerUnreachable(peer.to_string()));
        }
        self.endpoints
            .get(peer)
            .map(|e| e.value().clone())
            .ok_or_else(|| RelayError::PeerUnreachable(peer.to_string()))
    }
}

#[async_trait]
impl PeerTransport for LoopbackTransport {
    async fn advertise(
        &self,
        peer: &str,
        advertisement: Advertisement,
    ) -> Result<AdvertiseAck, RelayError> {
        Ok(self.endpoint(peer)?.handle_advertise(advertisement))
    }

    async fn pull_since(
        &self,
        peer: &str,
        request: PullRequest,
    ) -> Result<PullResponse, RelayError> {
        Ok(self.endpoint(peer)?.serve_pull(request))
    }

    async fn pull_registry(
        &self,
        peer: &str,
        since: u64,
        limit: usize,
    ) -> Result<RegistryChanges, RelayError> {
        Ok(self.endpoint(peer)?.serve_registry(since, limit))
    }
}
