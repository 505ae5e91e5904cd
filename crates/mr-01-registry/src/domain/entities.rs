//! Registry record types.

use serde::{Deserialize, Serialize};
use shared_types::Registration;

/// A registration as held in the binding table, live or removed.
///
/// Removed records are kept so the removal itself can replicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryRecord {
    pub registration: Registration,
    pub removed: bool,
}

impl RegistryRecord {
    pub fn live(registration: Registration) -> Self {
        Self {
            registration,
            removed: false,
        }
    }

    pub fn is_live(&self) -> bool {
        !self.removed
    }
}

/// A page of registry changes served to a peer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryChanges {
    /// Records changed after the requested revision, in revision order.
    pub records: Vec<RegistryRecord>,
    /// Revision of the last record returned (or the request revision if none).
    pub through: u64,
    /// Current head revision of the serving registry.
    pub head: u64,
}
