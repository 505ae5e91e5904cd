//! Tombstone proofs.
//!
//! ```text
//! proof = SHA-256( "mailbox-relay/tombstone/v1" || commitment || fingerprint
//!                  || origin || u64_be(origin_seq) )
//! ```
//!
//! The tombstone names the commitment it was issued under. A receiving node
//! checks the proof against that commitment and the commitment against every
//! owner the fingerprint has ever had, so deletions keep replicating after
//! the owner unregisters or rotates to a new key.

use sha2::{Digest, Sha256};
use shared_types::{EnvelopeId, Fingerprint, OwnerCommitment, Timestamp, Tombstone};

const TOMBSTONE_DOMAIN: &[u8] = b"mailbox-relay/tombstone/v1";

/// Compute the proof binding a deletion of `target` to `owner`.
pub fn tombstone_proof(
    owner: &OwnerCommitment,
    fingerprint: &Fingerprint,
    target: &EnvelopeId,
) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(TOMBSTONE_DOMAIN);
    hasher.update(owner.0);
    hasher.update(fingerprint.as_bytes());
    hasher.update(target.origin.0);
    hasher.update(target.origin_seq.to_be_bytes());
    hasher.finalize().into()
}

/// Build a tombstone for `target` on behalf of `owner`.
pub fn issue_tombstone(
    owner: &OwnerCommitment,
    fingerprint: Fingerprint,
    target: EnvelopeId,
    deleted_at: Timestamp,
) -> Tombstone {
    Tombstone {
        proof: tombstone_proof(owner, &fingerprint, &target),
        fingerprint,
        target,
        owner: *owner,
        deleted_at,
    }
}

/// Check that `tombstone` was issued under `owner`.
pub fn verify_tombstone(owner: &OwnerCommitment, tombstone: &Tombstone) -> bool {
    tombstone.owner == *owner
        && tombstone_proof(owner, &tombstone.fingerprint, &tombstone.target) == tombstone.proof
}
