//! # Registry Service
//!
//! Shared binding table guarded by per-pseudonym locking.
//!
//! ## Lock Discipline
//!
//! 1. `bindings` entry (one pseudonym, held for the whole operation)
//! 2. `change_log` mutex (revision assignment only)
//! 3. `by_fingerprint` entry (index maintenance, and the key-owner check
//!    together with the claim it guards)
//! 4. `owner_history` entry / `known_owners` (append only)
//!
//! Nested locks are only ever taken in that order, and no path holds a
//! `by_fingerprint` or `change_log` guard while touching `bindings`.

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use shared_types::{
    fingerprint, Fingerprint, NodeId, OwnerCommitment, OwnerToken, Pseudonym, PublicKey,
    Registration, RelayError, TimeSource, Timestamp,
};

use crate::domain::{resolve, MergeOutcome, RegistryChanges, RegistryRecord};
use crate::ports::inbound::RegistryApi;

/// A record plus the local revision that last touched it.
#[derive(Debug, Clone)]
struct Slot {
    record: RegistryRecord,
    revision: u64,
}

/// Index entry: who claims a fingerprint through which pseudonym.
#[derive(Debug, Clone, Copy)]
struct FingerprintClaim {
    owner: OwnerCommitment,
    claimed_at: Timestamp,
    origin: NodeId,
}

impl FingerprintClaim {
    fn of(reg: &Registration) -> Self {
        Self {
            owner: reg.owner,
            claimed_at: reg.claimed_at,
            origin: reg.origin,
        }
    }
}

#[derive(Default)]
struct ChangeLog {
    head: u64,
    entries: BTreeMap<u64, Pseudonym>,
}

/// Registry Service.
///
/// Thread-safe; share via `Arc`. Operations on different pseudonyms do not
/// contend beyond the sharding of the underlying map.
pub struct RegistryService {
    node_id: NodeId,
    clock: Arc<dyn TimeSource>,
    bindings: DashMap<Pseudonym, Slot>,
    by_fingerprint: DashMap<Fingerprint, HashMap<Pseudonym, FingerprintClaim>>,
    /// Owners each fingerprint has ever had. Never shrinks.
    owner_history: DashMap<Fingerprint, HashSet<OwnerCommitment>>,
    known_owners: DashSet<OwnerCommitment>,
    change_log: Mutex<ChangeLog>,
}

impl RegistryService {
    pub fn new(node_id: NodeId, clock: Arc<dyn TimeSource>) -> Self {
        Self {
            node_id,
            clock,
            bindings: DashMap::new(),
            by_fingerprint: DashMap::new(),
            owner_history: DashMap::new(),
            known_owners: DashSet::new(),
            change_log: Mutex::new(ChangeLog::default()),
        }
    }

    /// Number of live bindings.
    pub fn live_count(&self) -> usize {
        self.bindings.iter().filter(|s| s.record.is_live()).count()
    }

    /// Assign the next revision to `pseudonym`, retiring its previous one.
    fn next_revision(&self, pseudonym: &Pseudonym, previous: Option<u64>) -> u64 {
        let mut log = self.change_log.lock();
        if let Some(prev) = previous {
            log.entries.remove(&prev);
        }
        log.head += 1;
        let revision = log.head;
        log.entries.insert(revision, pseudonym.clone());
        revision
    }

    /// Claim `record`'s fingerprint for its pseudonym, failing if another
    /// pseudonym already holds it for a different owner. The check and the
    /// insert happen under one `by_fingerprint` entry guard.
    fn claim_key(&self, record: &RegistryRecord) -> Result<(), RelayError> {
        let reg = &record.registration;
        let mut claims = self.by_fingerprint.entry(reg.fingerprint).or_default();
        let foreign = claims
            .iter()
            .any(|(p, claim)| *p != reg.pseudonym && claim.owner != reg.owner);
        if foreign {
            return Err(RelayError::Unauthorized(
                "public key is bound by another owner".into(),
            ));
        }
        claims.insert(reg.pseudonym.clone(), FingerprintClaim::of(reg));
        drop(claims);
        self.remember(record);
        Ok(())
    }

    fn index_remove(&self, record: &RegistryRecord) {
        let reg = &record.registration;
        if let Entry::Occupied(mut claims) = self.by_fingerprint.entry(reg.fingerprint) {
            claims.get_mut().remove(&reg.pseudonym);
            if claims.get().is_empty() {
                claims.remove();
            }
        }
    }

    fn index_insert(&self, record: &RegistryRecord) {
        let reg = &record.registration;
        self.by_fingerprint
            .entry(reg.fingerprint)
            .or_default()
            .insert(reg.pseudonym.clone(), FingerprintClaim::of(reg));
    }

    /// Replace the index entries of `old` with those of `new`.
    fn reindex(&self, old: Option<&RegistryRecord>, new: &RegistryRecord) {
        if let Some(old) = old.filter(|r| r.is_live()) {
            self.index_remove(old);
        }
        if new.is_live() {
            self.index_insert(new);
        }
        self.remember(new);
    }

    /// Add `record`'s owner to the fingerprint's history.
    fn remember(&self, record: &RegistryRecord) {
        let reg = &record.registration;
        self.owner_history
            .entry(reg.fingerprint)
            .or_default()
            .insert(reg.owner);
        self.known_owners.insert(reg.owner);
    }
}

impl RegistryApi for RegistryService {
    fn register(
        &self,
        pseudonym: Pseudonym,
        public_key: PublicKey,
        token: &OwnerToken,
    ) -> Result<Registration, RelayError> {
        token.validate()?;
        let fp = fingerprint(&public_key)?;
        let owner = token.commitment();
        let now = self.clock.now_ms();

        let slot = self.bindings.entry(pseudonym.clone());
        let previous = match &slot {
            Entry::Occupied(o) => Some(o.get().clone()),
            Entry::Vacant(_) => None,
        };

        let (claimed_at, updated_at) = match &previous {
            Some(current) => {
                let reg = &current.record.registration;
                let live = current.record.is_live();
                if live && reg.owner != owner {
                    return Err(RelayError::PseudonymTaken(pseudonym.to_string()));
                }
                if live && reg.public_key == public_key {
                    debug!(pseudonym = %pseudonym, "Idempotent re-registration");
                    return Ok(reg.clone());
                }
                let updated_at = now.max(reg.updated_at + 1);
                (if live { reg.claimed_at } else { updated_at }, updated_at)
            }
            None => (now, now),
        };

        let record = RegistryRecord::live(Registration {
            pseudonym: pseudonym.clone(),
            public_key,
            fingerprint: fp,
            owner,
            claimed_at,
            updated_at,
            origin: self.node_id,
        });
        self.claim_key(&record)?;

        let revision = self.next_revision(&pseudonym, previous.as_ref().map(|s| s.revision));
        if let Some(old) = previous
            .as_ref()
            .map(|s| &s.record)
            .filter(|r| r.is_live() && r.registration.fingerprint != fp)
        {
            self.index_remove(old);
        }
        let fresh = Slot {
            record: record.clone(),
            revision,
        };
        match slot {
            Entry::Occupied(mut o) => {
                o.insert(fresh);
            }
            Entry::Vacant(v) => {
                v.insert(fresh);
            }
        }

        info!(pseudonym = %pseudonym, fingerprint = %fp, "Pseudonym registered");
        Ok(record.registration)
    }

    fn resolve(&self, pseudonym: &Pseudonym) -> Result<Registration, RelayError> {
        self.bindings
            .get(pseudonym)
            .filter(|slot| slot.record.is_live())
            .map(|slot| slot.record.registration.clone())
            .ok_or_else(|| RelayError::NotFound(format!("pseudonym {}", pseudonym)))
    }

    fn unregister(&self, pseudonym: &Pseudonym, token: &OwnerToken) -> Result<(), RelayError> {
        let Entry::Occupied(mut slot) = self.bindings.entry(pseudonym.clone()) else {
            return Err(RelayError::NotFound(format!("pseudonym {}", pseudonym)));
        };
        let current = slot.get().clone();
        if !current.record.is_live() {
            return Err(RelayError::NotFound(format!("pseudonym {}", pseudonym)));
        }
        if !current.record.registration.owner.verify(token) {
            return Err(RelayError::Unauthorized(format!(
                "owner token does not match pseudonym {}",
                pseudonym
            )));
        }

        let mut removed = current.record.clone();
        removed.removed = true;
        removed.registration.updated_at = self
            .clock
            .now_ms()
            .max(current.record.registration.updated_at + 1);
        removed.registration.origin = self.node_id;

        let revision = self.next_revision(pseudonym, Some(current.revision));
        self.reindex(Some(&current.record), &removed);
        slot.insert(Slot {
            record: removed,
            revision,
        });

        info!(pseudonym = %pseudonym, "Pseudonym unregistered");
        Ok(())
    }

    fn owner_of(&self, fingerprint: &Fingerprint) -> Option<OwnerCommitment> {
        self.by_fingerprint.get(fingerprint).and_then(|claims| {
            claims
                .values()
                .min_by_key(|c| (c.claimed_at, c.origin, c.owner.0))
                .map(|c| c.owner)
        })
    }

    fn owner_history(&self, fingerprint: &Fingerprint) -> Vec<OwnerCommitment> {
        self.owner_history
            .get(fingerprint)
            .map(|owners| owners.iter().copied().collect())
            .unwrap_or_default()
    }

    fn knows_owner(&self, owner: &OwnerCommitment) -> bool {
        self.known_owners.contains(owner)
    }

    fn revision(&self) -> u64 {
        self.change_log.lock().head
    }

    fn changes_since(&self, revision: u64, limit: usize) -> RegistryChanges {
        let (head, pending): (u64, Vec<(u64, Pseudonym)>) = {
            let log = self.change_log.lock();
            // Nothing can follow u64::MAX.
            let pending = match revision.checked_add(1) {
                Some(start) => log
                    .entries
                    .range(start..)
                    .take(limit)
                    .map(|(rev, p)| (*rev, p.clone()))
                    .collect(),
                None => Vec::new(),
            };
            (log.head, pending)
        };

        let through = pending.last().map(|(rev, _)| *rev).unwrap_or(revision.min(head));
        let records = pending
            .into_iter()
            .filter_map(|(_, p)| self.bindings.get(&p).map(|slot| slot.record.clone()))
            .collect();

        RegistryChanges {
            records,
            through,
            head,
        }
    }

    fn merge(&self, remote: RegistryRecord) -> bool {
        let pseudonym = remote.registration.pseudonym.clone();
        match self.bindings.entry(pseudonym.clone()) {
            Entry::Vacant(slot) => {
                let revision = self.next_revision(&pseudonym, None);
                self.reindex(None, &remote);
                slot.insert(Slot {
                    record: remote,
                    revision,
                });
            }
            Entry::Occupied(mut slot) => {
                let current = slot.get().clone();
                if resolve(&current.record, &remote) == MergeOutcome::KeepLocal {
                    return false;
                }
                let revision = self.next_revision(&pseudonym, Some(current.revision));
                self.reindex(Some(&current.record), &remote);
                slot.insert(Slot {
                    record: remote,
                    revision,
                });
            }
        }
        debug!(pseudonym = %pseudonym, "Merged registry record from peer");
        true
    }
}
