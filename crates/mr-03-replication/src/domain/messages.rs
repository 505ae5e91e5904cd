//! Peer protocol messages.
//!
//! Byte fields travel as hex in JSON via the shared entity serializers.

use serde::{Deserialize, Serialize};
use shared_types::{Fingerprint, LogEntry, NodeId};

/// Highest local sequence a node holds for one fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintHead {
    pub fingerprint: Fingerprint,
    pub head: u64,
}

/// `Advertise(node, [(fingerprint, highWaterMark)], registryRevision)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advertisement {
    pub node_id: NodeId,
    /// Address the receiver should pull from.
    pub address: String,
    pub heads: Vec<FingerprintHead>,
    pub registry_revision: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvertiseAck {
    pub node_id: NodeId,
    /// Fingerprints the receiver queued for pulling.
    pub queued: usize,
}

/// `PullSince(fingerprint, sequenceNumber, limit)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub fingerprint: Fingerprint,
    /// Last sequence already held by the puller; `None` pulls from the start.
    #[serde(default)]
    pub since: Option<u64>,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullResponse {
    /// Entries in ascending local sequence order of the serving node.
    pub entries: Vec<LogEntry>,
    /// Serving node's head for the fingerprint.
    pub head: Option<u64>,
}

/// `PullRegistry(revision, limit)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryPullRequest {
    pub since: u64,
    pub limit: usize,
}
