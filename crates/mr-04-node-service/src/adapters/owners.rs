//! Mailbox ownership backed by the registry.

use std::sync::Arc;

use mr_01_registry::RegistryApi;
use mr_02_mailbox_store::OwnerDirectory;
use shared_types::{Fingerprint, OwnerCommitment};

/// Answers the store's ownership questions from the registry: `owner_of`
/// from live bindings, tombstone checks from the owner history.
pub struct RegistryOwnerDirectory {
    registry: Arc<dyn RegistryApi>,
}

impl RegistryOwnerDirectory {
    pub fn new(registry: Arc<dyn RegistryApi>) -> Self {
        Self { registry }
    }
}

impl OwnerDirectory for RegistryOwnerDirectory {
    fn owner_of(&self, fingerprint: &Fingerprint) -> Option<OwnerCommitment> {
        self.registry.owner_of(fingerprint)
    }

    fn owner_history(&self, fingerprint: &Fingerprint) -> Vec<OwnerCommitment> {
        self.registry.owner_history(fingerprint)
    }

    fn knows_owner(&self, owner: &OwnerCommitment) -> bool {
        self.registry.knows_owner(owner)
    }
}
