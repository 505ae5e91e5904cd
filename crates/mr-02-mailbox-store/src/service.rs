//! # Mailbox Store Service
//!
//! Sharded map of per-fingerprint mailboxes, each behind its own mutex.
//! Appends, reads and deletes on different fingerprints never contend;
//! operations on one fingerprint serialize, which keeps sequence assignment
//! monotonic.
//!
//! Every mutation follows prepare → persist → apply under the mailbox lock,
//! so a persistence failure leaves the in-memory state untouched.
//!
//! Mutations hold the `compaction` gate shared; compaction holds it
//! exclusively while it rewrites the persisted log. The gate is always taken
//! before any mailbox lock.

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, info, warn};

use shared_types::{
    Envelope, EnvelopeId, Fingerprint, LogEntry, NodeId, OwnerCommitment, OwnerToken, RelayError,
    StoredEnvelope, SyncItem, TimeSource, Tombstone,
};

use crate::domain::{issue_tombstone, verify_tombstone, Mailbox, StoreConfig};
use crate::ports::inbound::MailboxStoreApi;
use crate::ports::outbound::{MailboxPersistence, OwnerDirectory, PersistedEntry};

/// Mailbox Store Service.
///
/// Thread-safe; share via `Arc`.
pub struct MailboxStoreService {
    node_id: NodeId,
    config: StoreConfig,
    owners: Arc<dyn OwnerDirectory>,
    persistence: Arc<dyn MailboxPersistence>,
    clock: Arc<dyn TimeSource>,
    mailboxes: DashMap<Fingerprint, Arc<Mutex<Mailbox>>>,
    compaction: RwLock<()>,
}

impl MailboxStoreService {
    /// Build the store and replay everything `persistence` holds.
    pub fn open(
        node_id: NodeId,
        config: StoreConfig,
        owners: Arc<dyn OwnerDirectory>,
        persistence: Arc<dyn MailboxPersistence>,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Self, RelayError> {
        let service = Self {
            node_id,
            config,
            owners,
            persistence,
            clock,
            mailboxes: DashMap::new(),
            compaction: RwLock::new(()),
        };

        let persisted = service.persistence.load()?;
        let replayed = persisted.len();
        for PersistedEntry { fingerprint, entry } in persisted {
            service.mailbox_or_create(&fingerprint).lock().apply(entry);
        }
        if replayed > 0 {
            info!(
                entries = replayed,
                mailboxes = service.mailboxes.len(),
                "Replayed mailbox log"
            );
        }

        Ok(service)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn mailbox(&self, fingerprint: &Fingerprint) -> Option<Arc<Mutex<Mailbox>>> {
        self.mailboxes.get(fingerprint).map(|m| m.value().clone())
    }

    fn mailbox_or_create(&self, fingerprint: &Fingerprint) -> Arc<Mutex<Mailbox>> {
        self.mailboxes.entry(*fingerprint).or_default().value().clone()
    }

    /// Run `f` against an existing mailbox under its lock.
    fn read<R>(&self, fingerprint: &Fingerprint, f: impl FnOnce(&Mailbox) -> R) -> Option<R> {
        let mailbox = self.mailbox(fingerprint)?;
        let guard = mailbox.lock();
        Some(f(&guard))
    }

    fn authorize(
        &self,
        fingerprint: &Fingerprint,
        token: &OwnerToken,
    ) -> Result<OwnerCommitment, RelayError> {
        let owner = self.owners.owner_of(fingerprint).ok_or_else(|| {
            RelayError::Unauthorized(format!("no owner registered for {}", fingerprint))
        })?;
        if !owner.verify(token) {
            return Err(RelayError::Unauthorized(format!(
                "owner token does not match {}",
                fingerprint
            )));
        }
        Ok(owner)
    }

    /// Accept a replicated tombstone if its proof opens under the owner it
    /// names and that owner held the fingerprint at some point. With no
    /// history for the fingerprint, any owner this node has a registration
    /// for is accepted; an owner it has never seen yields `NotFound` so the
    /// caller can retry once the registry catches up.
    fn check_tombstone_owner(&self, tombstone: &Tombstone) -> Result<(), RelayError> {
        let fingerprint = &tombstone.fingerprint;
        if !verify_tombstone(&tombstone.owner, tombstone) {
            warn!(fingerprint = %fingerprint, target = ?tombstone.target, "Rejected tombstone with bad proof");
            return Err(RelayError::Unauthorized(format!(
                "tombstone proof does not match its owner for {}",
                fingerprint
            )));
        }

        let history = self.owners.owner_history(fingerprint);
        if history.contains(&tombstone.owner) {
            return Ok(());
        }
        if !history.is_empty() {
            warn!(fingerprint = %fingerprint, target = ?tombstone.target, "Rejected tombstone from a stranger");
            return Err(RelayError::Unauthorized(format!(
                "tombstone owner never held {}",
                fingerprint
            )));
        }
        if self.owners.knows_owner(&tombstone.owner) {
            return Ok(());
        }
        Err(RelayError::NotFound(format!("owner of {}", fingerprint)))
    }

    /// Persist then apply a batch of entries to a locked mailbox.
    fn commit(
        &self,
        fingerprint: &Fingerprint,
        mailbox: &mut Mailbox,
        entries: Vec<LogEntry>,
    ) -> Result<(), RelayError> {
        let persisted: Vec<PersistedEntry> = entries
            .iter()
            .map(|entry| PersistedEntry {
                fingerprint: *fingerprint,
                entry: entry.clone(),
            })
            .collect();
        self.persistence.persist(&persisted)?;
        for entry in entries {
            mailbox.apply(entry);
        }
        Ok(())
    }

    fn tombstone_entries(
        &self,
        mailbox: &Mailbox,
        owner: &OwnerCommitment,
        fingerprint: &Fingerprint,
        targets: &[EnvelopeId],
    ) -> Vec<LogEntry> {
        let now = self.clock.now_ms();
        let first = mailbox.next_sequence();
        targets
            .iter()
            .zip(first..)
            .map(|(target, sequence)| LogEntry {
                sequence,
                item: SyncItem::Tombstone(issue_tombstone(owner, *fingerprint, *target, now)),
            })
            .collect()
    }
}

impl MailboxStoreApi for MailboxStoreService {
    fn append(
        &self,
        fingerprint: &Fingerprint,
        sender: Vec<u8>,
        ciphertext: Vec<u8>,
    ) -> Result<u64, RelayError> {
        let _gate = self.compaction.read();
        let mailbox = self.mailbox_or_create(fingerprint);
        let mut mailbox = mailbox.lock();
        mailbox.ensure_capacity(self.config.mailbox_cap)?;

        let sequence = mailbox.next_sequence();
        let envelope = Envelope {
            id: EnvelopeId {
                origin: self.node_id,
                origin_seq: sequence,
            },
            sender,
            ciphertext,
            inserted_at: self.clock.now_ms(),
        };
        self.commit(
            fingerprint,
            &mut mailbox,
            vec![LogEntry {
                sequence,
                item: SyncItem::Envelope(envelope),
            }],
        )?;

        debug!(fingerprint = %fingerprint, sequence, "Envelope appended");
        Ok(sequence)
    }

    fn count(&self, fingerprint: &Fingerprint) -> usize {
        self.read(fingerprint, Mailbox::live_count).unwrap_or(0)
    }

    fn get(&self, fingerprint: &Fingerprint, index: u64) -> Result<StoredEnvelope, RelayError> {
        self.read(fingerprint, |m| m.get(index))
            .unwrap_or(Err(RelayError::IndexOutOfRange { index }))
    }

    fn fetch(
        &self,
        fingerprint: &Fingerprint,
        from: usize,
        limit: usize,
    ) -> Result<Vec<StoredEnvelope>, RelayError> {
        self.read(fingerprint, |m| m.fetch(from, limit))
            .ok_or_else(|| RelayError::NotFound(format!("mailbox {}", fingerprint)))
    }

    fn delete_one(
        &self,
        fingerprint: &Fingerprint,
        index: u64,
        token: &OwnerToken,
    ) -> Result<(), RelayError> {
        let owner = self.authorize(fingerprint, token)?;
        let _gate = self.compaction.read();
        let mailbox = self
            .mailbox(fingerprint)
            .ok_or(RelayError::IndexOutOfRange { index })?;
        let mut mailbox = mailbox.lock();

        let target = mailbox.get(index)?.envelope.id;
        let entries = self.tombstone_entries(&mailbox, &owner, fingerprint, &[target]);
        self.commit(fingerprint, &mut mailbox, entries)?;

        info!(fingerprint = %fingerprint, index, "Envelope deleted");
        Ok(())
    }

    fn delete_all(
        &self,
        fingerprint: &Fingerprint,
        token: &OwnerToken,
    ) -> Result<usize, RelayError> {
        let owner = self.authorize(fingerprint, token)?;
        let _gate = self.compaction.read();
        let Some(mailbox) = self.mailbox(fingerprint) else {
            return Ok(0);
        };
        let mut mailbox = mailbox.lock();

        let targets = mailbox.live_ids();
        let entries = self.tombstone_entries(&mailbox, &owner, fingerprint, &targets);
        self.commit(fingerprint, &mut mailbox, entries)?;

        info!(fingerprint = %fingerprint, deleted = targets.len(), "Mailbox cleared");
        Ok(targets.len())
    }

    fn head(&self, fingerprint: &Fingerprint) -> Option<u64> {
        self.read(fingerprint, Mailbox::head).flatten()
    }

    fn entries_since(
        &self,
        fingerprint: &Fingerprint,
        since: Option<u64>,
        limit: usize,
    ) -> Vec<LogEntry> {
        let limit = limit.min(self.config.max_entries_per_pull);
        self.read(fingerprint, |m| m.entries_since(since, limit))
            .unwrap_or_default()
    }

    fn merge_envelope(
        &self,
        fingerprint: &Fingerprint,
        envelope: Envelope,
    ) -> Result<bool, RelayError> {
        let _gate = self.compaction.read();
        let mailbox = self.mailbox_or_create(fingerprint);
        let mut mailbox = mailbox.lock();
        if !mailbox.accepts_envelope(&envelope) {
            return Ok(false);
        }

        let id = envelope.id;
        let sequence = mailbox.next_sequence();
        self.commit(
            fingerprint,
            &mut mailbox,
            vec![LogEntry {
                sequence,
                item: SyncItem::Envelope(envelope),
            }],
        )?;

        debug!(fingerprint = %fingerprint, origin = %id.origin, origin_seq = id.origin_seq, sequence, "Merged envelope");
        Ok(true)
    }

    fn merge_tombstone(&self, tombstone: Tombstone) -> Result<bool, RelayError> {
        let fingerprint = tombstone.fingerprint;
        self.check_tombstone_owner(&tombstone)?;

        let _gate = self.compaction.read();
        let mailbox = self.mailbox_or_create(&fingerprint);
        let mut mailbox = mailbox.lock();
        if !mailbox.accepts_tombstone(&tombstone) {
            return Ok(false);
        }

        let target = tombstone.target;
        let sequence = mailbox.next_sequence();
        self.commit(
            &fingerprint,
            &mut mailbox,
            vec![LogEntry {
                sequence,
                item: SyncItem::Tombstone(tombstone),
            }],
        )?;

        debug!(fingerprint = %fingerprint, target = ?target, sequence, "Merged tombstone");
        Ok(true)
    }

    fn compact(&self) -> Result<usize, RelayError> {
        let horizon = self
            .clock
            .now_ms()
            .saturating_sub(self.config.tombstone_retention_ms);
        let _gate = self.compaction.write();

        let mut mailboxes: Vec<(Fingerprint, Arc<Mutex<Mailbox>>)> = self
            .mailboxes
            .iter()
            .map(|m| (*m.key(), m.value().clone()))
            .collect();
        mailboxes.sort_unstable_by_key(|(fp, _)| *fp);

        let mut plan = Vec::new();
        let mut retained = Vec::new();
        let mut expired_total = 0;
        for (fingerprint, mailbox) in &mailboxes {
            let guard = mailbox.lock();
            let expired = guard.expired_tombstones(horizon);
            expired_total += expired.len();
            retained.extend(
                guard
                    .entries_since(None, usize::MAX)
                    .into_iter()
                    .filter(|entry| expired.binary_search(&entry.sequence).is_err())
                    .map(|entry| PersistedEntry {
                        fingerprint: *fingerprint,
                        entry,
                    }),
            );
            if !expired.is_empty() {
                plan.push((mailbox.clone(), expired));
            }
        }
        if expired_total == 0 {
            return Ok(0);
        }

        self.persistence.rewrite(&retained)?;
        let dropped: usize = plan
            .into_iter()
            .map(|(mailbox, expired)| mailbox.lock().drop_tombstones(&expired))
            .sum();

        info!(dropped, retained = retained.len(), horizon, "Compacted mailbox log");
        Ok(dropped)
    }

    fn mailbox_count(&self) -> usize {
        self.mailboxes.len()
    }

    fn hosted(&self, after: Option<&Fingerprint>, limit: usize) -> Vec<(Fingerprint, u64)> {
        let mut keys: Vec<Fingerprint> = self
            .mailboxes
            .iter()
            .map(|m| *m.key())
            .filter(|fp| after.map_or(true, |a| fp > a))
            .collect();
        keys.sort_unstable();

        keys.into_iter()
            .filter_map(|fp| self.head(&fp).map(|head| (fp, head)))
            .take(limit)
            .collect()
    }
}
