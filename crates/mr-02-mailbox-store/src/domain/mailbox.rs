//! The per-fingerprint mailbox log.
//!
//! Every change to a mailbox, local or replicated, is a [`LogEntry`] with a
//! local sequence number. Entries are prepared against the current state,
//! persisted by the service, then committed with [`Mailbox::apply`]. Replay
//! at start-up goes through the same `apply`.

use std::collections::{BTreeMap, HashMap, HashSet};

use shared_types::{
    Envelope, EnvelopeId, LogEntry, NodeId, RelayError, StoredEnvelope, SyncItem, Timestamp,
    Tombstone,
};

type DisplayKey = (Timestamp, NodeId, u64);

/// In-memory state of one mailbox.
#[derive(Debug, Default)]
pub struct Mailbox {
    /// Next local sequence; never decreases.
    next_sequence: u64,
    /// Log slots still holding data. Deleted envelopes are dropped from here.
    entries: BTreeMap<u64, SyncItem>,
    /// Live envelopes in display order, mapped to their local sequence.
    live: BTreeMap<DisplayKey, u64>,
    /// Every envelope id ever logged here.
    seen: HashMap<EnvelopeId, u64>,
    /// Every envelope id deleted here, including ones whose envelope never arrived.
    deleted: HashSet<EnvelopeId>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live envelopes.
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Sequence the next entry will receive.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Highest local sequence assigned so far.
    pub fn head(&self) -> Option<u64> {
        self.next_sequence.checked_sub(1)
    }

    pub fn ensure_capacity(&self, cap: usize) -> Result<(), RelayError> {
        let count = self.live_count();
        if count >= cap {
            return Err(RelayError::MailboxFull { count, cap });
        }
        Ok(())
    }

    /// Whether a replicated envelope would add anything.
    pub fn accepts_envelope(&self, envelope: &Envelope) -> bool {
        !self.seen.contains_key(&envelope.id) && !self.deleted.contains(&envelope.id)
    }

    /// Whether a replicated tombstone would add anything.
    pub fn accepts_tombstone(&self, tombstone: &Tombstone) -> bool {
        !self.deleted.contains(&tombstone.target)
    }

    /// Resolve a local sequence to a live envelope.
    pub fn get(&self, index: u64) -> Result<StoredEnvelope, RelayError> {
        match self.entries.get(&index) {
            Some(SyncItem::Envelope(envelope)) if !self.deleted.contains(&envelope.id) => {
                Ok(StoredEnvelope {
                    sequence: index,
                    envelope: envelope.clone(),
                })
            }
            _ => Err(RelayError::IndexOutOfRange { index }),
        }
    }

    /// Live envelopes in display order, skipping `from` and returning at most `limit`.
    pub fn fetch(&self, from: usize, limit: usize) -> Vec<StoredEnvelope> {
        self.live
            .values()
            .skip(from)
            .take(limit)
            .filter_map(|seq| self.get(*seq).ok())
            .collect()
    }

    /// Ids of all live envelopes, in display order.
    pub fn live_ids(&self) -> Vec<EnvelopeId> {
        self.live
            .values()
            .filter_map(|seq| match self.entries.get(seq) {
                Some(SyncItem::Envelope(e)) => Some(e.id),
                _ => None,
            })
            .collect()
    }

    /// Log entries with sequence above `since` (all of them for `None`).
    pub fn entries_since(&self, since: Option<u64>, limit: usize) -> Vec<LogEntry> {
        let start = since.map_or(0, |s| s.saturating_add(1));
        self.entries
            .range(start..)
            .take(limit)
            .map(|(seq, item)| LogEntry {
                sequence: *seq,
                item: item.clone(),
            })
            .collect()
    }

    /// Sequences of tombstones issued before `horizon`, never including the
    /// head slot so the next sequence survives a rewrite of the log.
    pub fn expired_tombstones(&self, horizon: Timestamp) -> Vec<u64> {
        let head = self.head();
        self.entries
            .iter()
            .filter(|(seq, item)| {
                Some(**seq) != head
                    && matches!(item, SyncItem::Tombstone(t) if t.deleted_at < horizon)
            })
            .map(|(seq, _)| *seq)
            .collect()
    }

    /// Forget the given tombstones and the ids they deleted.
    ///
    /// An envelope deleted by a forgotten tombstone is accepted again if a
    /// peer still offers it, so the retention horizon must outlast any
    /// partition.
    pub fn drop_tombstones(&mut self, sequences: &[u64]) -> usize {
        let mut dropped = 0;
        for sequence in sequences {
            if let Some(SyncItem::Tombstone(tombstone)) = self.entries.remove(sequence) {
                self.deleted.remove(&tombstone.target);
                self.seen.remove(&tombstone.target);
                dropped += 1;
            }
        }
        dropped
    }

    /// Number of log slots still holding data.
    pub fn retained_len(&self) -> usize {
        self.entries.len()
    }

    /// Number of deleted ids remembered.
    pub fn deleted_len(&self) -> usize {
        self.deleted.len()
    }

    /// Commit an entry. Entries must arrive in increasing sequence order.
    pub fn apply(&mut self, entry: LogEntry) {
        let LogEntry { sequence, item } = entry;
        self.next_sequence = self.next_sequence.max(sequence + 1);

        match item {
            SyncItem::Envelope(envelope) => {
                self.seen.insert(envelope.id, sequence);
                if self.deleted.contains(&envelope.id) {
                    return;
                }
                self.live.insert(envelope.display_key(), sequence);
                self.entries.insert(sequence, SyncItem::Envelope(envelope));
            }
            SyncItem::Tombstone(tombstone) => {
                let target = tombstone.target;
                self.deleted.insert(target);
                if let Some(seq) = self.seen.get(&target) {
                    if let Some(SyncItem::Envelope(envelope)) = self.entries.remove(seq) {
                        self.live.remove(&envelope.display_key());
                    }
                }
                self.entries.insert(sequence, SyncItem::Tombstone(tombstone));
            }
        }
    }
}
