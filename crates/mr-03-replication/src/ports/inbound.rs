//! # Inbound Ports
//!
//! [`PeerSyncApi`] is what peers call; [`ReplicationApi`] is what the local
//! node service calls.

use mr_01_registry::RegistryChanges;
use shared_types::Fingerprint;

use crate::domain::{AdvertiseAck, Advertisement, PeerStatus, PullRequest, PullResponse};
use crate::service::ReplicationStats;

/// Server side of the peer protocol.
pub trait PeerSyncApi: Send + Sync {
    /// Record a peer's heads and queue the fingerprints it is ahead on.
    fn handle_advertise(&self, advertisement: Advertisement) -> AdvertiseAck;

    /// `PullSince`: entries of the local log above `since`.
    fn serve_pull(&self, request: PullRequest) -> PullResponse;

    /// `PullRegistry`: registry records changed after `since`.
    fn serve_registry(&self, since: u64, limit: usize) -> RegistryChanges;
}

/// Local control surface of replication.
pub trait ReplicationApi: PeerSyncApi {
    /// A local change to `fingerprint` should reach every peer.
    fn announce(&self, fingerprint: Fingerprint);

    fn peer_status(&self) -> Vec<PeerStatus>;

    fn stats(&self) -> ReplicationStats;
}
