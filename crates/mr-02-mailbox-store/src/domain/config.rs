//! Store configuration.

use serde::{Deserialize, Serialize};

/// Mailbox Store limits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Maximum live envelopes per mailbox accepted from clients.
    pub mailbox_cap: usize,
    /// Upper bound on entries returned by one `entries_since` call.
    pub max_entries_per_pull: usize,
    /// Tombstones older than this are forgotten by compaction. Must outlast
    /// the longest partition, or a deleted envelope can come back.
    pub tombstone_retention_ms: u64,
    /// How often the node runtime compacts the store.
    pub compaction_interval_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            mailbox_cap: 10_000,
            max_entries_per_pull: 512,
            tombstone_retention_ms: 7 * 24 * 60 * 60 * 1_000,
            compaction_interval_ms: 60 * 60 * 1_000,
        }
    }
}
