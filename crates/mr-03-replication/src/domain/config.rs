//! Replication configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Replication tuning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Interval between sessions with a healthy peer, in ms.
    pub sync_interval_ms: u64,
    /// Upper bound on one whole session with a peer, in ms.
    pub session_timeout_ms: u64,
    /// Fingerprints per advertisement.
    pub advertise_batch: usize,
    /// Log entries requested per `PullSince`.
    pub pull_batch: usize,
    /// Registry records requested per `PullRegistry`.
    pub registry_batch: usize,
    /// Fingerprints a single session pulls before yielding.
    pub max_pulls_per_session: usize,
    /// Depth of each per-peer pending queue.
    pub pending_queue_depth: usize,
    /// First retry delay after a failure, in ms.
    pub backoff_base_ms: u64,
    /// Retry delay ceiling, also the retry interval for inactive peers, in ms.
    pub backoff_cap_ms: u64,
    /// Consecutive failures after which a peer is marked inactive.
    pub inactive_after_failures: u32,
    /// Peers accepted in total, including ones that introduce themselves.
    pub max_peers: usize,
}

impl SyncConfig {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_interval_ms: 2_000,
            session_timeout_ms: 10_000,
            advertise_batch: 256,
            pull_batch: 256,
            registry_batch: 256,
            max_pulls_per_session: 64,
            pending_queue_depth: 1_024,
            backoff_base_ms: 500,
            backoff_cap_ms: 60_000,
            inactive_after_failures: 5,
            max_peers: 64,
        }
    }
}
