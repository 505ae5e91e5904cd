//! Inbound ports (API) for the Registry subsystem.

use shared_types::{Fingerprint, OwnerCommitment, OwnerToken, Pseudonym, PublicKey, Registration, RelayError};

use crate::domain::{RegistryChanges, RegistryRecord};

/// Primary API for pseudonym bindings.
pub trait RegistryApi: Send + Sync {
    /// Bind `pseudonym` to `public_key` for the holder of `token`.
    ///
    /// Re-registering with the same token overwrites the caller's own binding.
    ///
    /// # Errors
    /// * `PseudonymTaken` - bound to a different live owner
    /// * `InvalidKey` - empty public key
    /// * `Unauthorized` - the key is already bound by a different owner
    fn register(
        &self,
        pseudonym: Pseudonym,
        public_key: PublicKey,
        token: &OwnerToken,
    ) -> Result<Registration, RelayError>;

    /// Look up the live binding of a pseudonym.
    fn resolve(&self, pseudonym: &Pseudonym) -> Result<Registration, RelayError>;

    /// Remove a binding. Only its owner may do this.
    fn unregister(&self, pseudonym: &Pseudonym, token: &OwnerToken) -> Result<(), RelayError>;

    /// Owner commitment controlling the mailbox of `fingerprint`, if registered.
    fn owner_of(&self, fingerprint: &Fingerprint) -> Option<OwnerCommitment>;

    /// Every owner commitment that has ever held `fingerprint`, including
    /// owners that have since unregistered or moved to another key.
    fn owner_history(&self, fingerprint: &Fingerprint) -> Vec<OwnerCommitment>;

    /// Whether any record seen by this node, live or removed, names `owner`.
    fn knows_owner(&self, owner: &OwnerCommitment) -> bool;

    /// Current head revision of the local change log.
    fn revision(&self) -> u64;

    /// Records changed after `revision`, at most `limit` of them.
    fn changes_since(&self, revision: u64, limit: usize) -> RegistryChanges;

    /// Apply a record received from a peer. Returns true if local state changed.
    fn merge(&self, remote: RegistryRecord) -> bool;
}
