//! Per-peer replication state.

use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

use shared_types::{Fingerprint, NodeId};

use super::{SyncConfig, SyncQueue};

/// What this node knows about one peer.
#[derive(Debug, Clone)]
pub struct PeerState {
    pub address: String,
    /// Learned from the peer's first advertisement.
    pub node_id: Option<NodeId>,
    /// Highest sequence of the *peer's* log already pulled, per fingerprint.
    pub high_water: HashMap<Fingerprint, u64>,
    /// Peer registry revision already pulled.
    pub registry_high_water: u64,
    /// Fingerprints the peer advertised ahead of our high-water mark.
    pub pending: SyncQueue,
    /// Fingerprints changed locally that the peer has not been told about.
    pub outbound: SyncQueue,
    /// Last hosted fingerprint advertised; the next advertisement resumes after it.
    pub advertise_cursor: Option<Fingerprint>,
    pub consecutive_failures: u32,
    pub active: bool,
    pub last_success_ms: Option<u64>,
}

impl PeerState {
    pub fn new(address: impl Into<String>, config: &SyncConfig) -> Self {
        Self {
            address: address.into(),
            node_id: None,
            high_water: HashMap::new(),
            registry_high_water: 0,
            pending: SyncQueue::new(config.pending_queue_depth),
            outbound: SyncQueue::new(config.pending_queue_depth),
            advertise_cursor: None,
            consecutive_failures: 0,
            active: true,
            last_success_ms: None,
        }
    }

    /// Whether an advertised head is ahead of what was pulled.
    pub fn is_behind(&self, fingerprint: &Fingerprint, head: u64) -> bool {
        self.high_water.get(fingerprint).map_or(true, |hw| head > *hw)
    }

    pub fn advance(&mut self, fingerprint: Fingerprint, sequence: u64) {
        let hw = self.high_water.entry(fingerprint).or_insert(sequence);
        *hw = (*hw).max(sequence);
    }

    pub fn record_success(&mut self, now_ms: u64) {
        self.consecutive_failures = 0;
        self.active = true;
        self.last_success_ms = Some(now_ms);
    }

    /// Count a failed session and return the delay before the next attempt
    /// (before jitter).
    pub fn record_failure(&mut self, config: &SyncConfig) -> Duration {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.consecutive_failures >= config.inactive_after_failures {
            self.active = false;
        }
        self.retry_delay(config)
    }

    /// Delay before the next session.
    pub fn retry_delay(&self, config: &SyncConfig) -> Duration {
        if self.consecutive_failures == 0 {
            return config.sync_interval();
        }
        if !self.active {
            return Duration::from_millis(config.backoff_cap_ms);
        }
        backoff_delay(
            self.consecutive_failures,
            config.backoff_base_ms,
            config.backoff_cap_ms,
        )
    }

    pub fn status(&self) -> PeerStatus {
        PeerStatus {
            address: self.address.clone(),
            node_id: self.node_id,
            active: self.active,
            consecutive_failures: self.consecutive_failures,
            pending: self.pending.len(),
            dropped_hints: self.pending.dropped() + self.outbound.dropped(),
            tracked_fingerprints: self.high_water.len(),
            registry_high_water: self.registry_high_water,
            last_success_ms: self.last_success_ms,
        }
    }
}

/// `base * 2^(failures - 1)`, capped.
pub fn backoff_delay(failures: u32, base_ms: u64, cap_ms: u64) -> Duration {
    let exponent = failures.saturating_sub(1).min(32);
    let delay = base_ms.saturating_mul(1u64 << exponent).min(cap_ms);
    Duration::from_millis(delay)
}

/// Snapshot of a peer for `/v1/stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerStatus {
    pub address: String,
    pub node_id: Option<NodeId>,
    pub active: bool,
    pub consecutive_failures: u32,
    pub pending: usize,
    pub dropped_hints: u64,
    pub tracked_fingerprints: usize,
    pub registry_high_water: u64,
    pub last_success_ms: Option<u64>,
}
