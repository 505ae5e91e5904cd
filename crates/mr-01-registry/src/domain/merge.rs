//! Conflict resolution for replicated registry records.
//!
//! Two nodes may accept changes to the same pseudonym without coordinating.
//! The winner is a pure function of the two records, so every node converges
//! on the same binding regardless of the order it hears about them.
//!
//! | Local vs remote              | Winner                                   |
//! |------------------------------|------------------------------------------|
//! | same owner                   | later `(updated_at, origin, removed)`    |
//! | different owners, both live  | earlier `(claimed_at, origin)`           |
//! | different owners, otherwise  | later `(updated_at, origin, removed)`    |

use shared_types::{NodeId, Timestamp};

use super::RegistryRecord;

/// Which side of a merge survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    KeepLocal,
    TakeRemote,
}

type UpdateKey = (Timestamp, NodeId, bool, Timestamp, [u8; 32], [u8; 32]);

// Trailing fields only break ties, keeping the order total.
fn update_key(record: &RegistryRecord) -> UpdateKey {
    let r = &record.registration;
    (
        r.updated_at,
        r.origin,
        record.removed,
        r.claimed_at,
        r.owner.0,
        *r.fingerprint.as_bytes(),
    )
}

fn claim_key(record: &RegistryRecord) -> (Timestamp, NodeId, [u8; 32]) {
    let r = &record.registration;
    (r.claimed_at, r.origin, r.owner.0)
}

/// Decide whether `remote` replaces `local`.
pub fn resolve(local: &RegistryRecord, remote: &RegistryRecord) -> MergeOutcome {
    if local == remote {
        return MergeOutcome::KeepLocal;
    }

    let same_owner = local.registration.owner == remote.registration.owner;
    let remote_wins = if !same_owner && local.is_live() && remote.is_live() {
        claim_key(remote) < claim_key(local)
    } else {
        update_key(remote) > update_key(local)
    };

    if remote_wins {
        MergeOutcome::TakeRemote
    } else {
        MergeOutcome::KeepLocal
    }
}
