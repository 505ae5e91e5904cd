//! # Inbound Ports (Driving Ports)
//!
//! The API the Mailbox Store offers to the node service and to replication.

use shared_types::{
    Envelope, Fingerprint, LogEntry, OwnerToken, RelayError, StoredEnvelope, Tombstone,
};

/// Mailbox Store API.
///
/// `index` arguments are local sequence numbers as returned by `append`.
pub trait MailboxStoreApi: Send + Sync {
    // === Client operations ===

    /// Deposit ciphertext. Unauthenticated. Returns the local sequence number.
    fn append(
        &self,
        fingerprint: &Fingerprint,
        sender: Vec<u8>,
        ciphertext: Vec<u8>,
    ) -> Result<u64, RelayError>;

    /// Number of live envelopes (zero for an unknown mailbox).
    fn count(&self, fingerprint: &Fingerprint) -> usize;

    fn get(&self, fingerprint: &Fingerprint, index: u64) -> Result<StoredEnvelope, RelayError>;

    /// Live envelopes in display order starting at position `from`.
    fn fetch(
        &self,
        fingerprint: &Fingerprint,
        from: usize,
        limit: usize,
    ) -> Result<Vec<StoredEnvelope>, RelayError>;

    fn delete_one(
        &self,
        fingerprint: &Fingerprint,
        index: u64,
        token: &OwnerToken,
    ) -> Result<(), RelayError>;

    /// Tombstone every live envelope. Returns how many were deleted.
    fn delete_all(&self, fingerprint: &Fingerprint, token: &OwnerToken)
        -> Result<usize, RelayError>;

    // === Replication hooks ===

    /// Highest local sequence held for `fingerprint`.
    fn head(&self, fingerprint: &Fingerprint) -> Option<u64>;

    /// Log entries with local sequence above `since`.
    fn entries_since(&self, fingerprint: &Fingerprint, since: Option<u64>, limit: usize)
        -> Vec<LogEntry>;

    /// Add a replicated envelope. `Ok(false)` if it was already known or deleted.
    fn merge_envelope(&self, fingerprint: &Fingerprint, envelope: Envelope)
        -> Result<bool, RelayError>;

    /// Apply a replicated tombstone after checking its proof.
    ///
    /// The proof is checked against the owner the tombstone names, which must
    /// have held the fingerprint at some point, not necessarily now.
    ///
    /// `NotFound` when neither the fingerprint's owners nor the named owner
    /// are known yet, `Unauthorized` when the proof does not open or the
    /// named owner never held the fingerprint.
    fn merge_tombstone(&self, tombstone: Tombstone) -> Result<bool, RelayError>;

    /// Forget tombstones older than the retention horizon and rewrite the
    /// persisted log without them. Returns how many were dropped.
    fn compact(&self) -> Result<usize, RelayError>;

    /// Number of mailboxes held on this node.
    fn mailbox_count(&self) -> usize;

    /// Hosted fingerprints after `after` in byte order, with their heads.
    fn hosted(&self, after: Option<&Fingerprint>, limit: usize) -> Vec<(Fingerprint, u64)>;
}
