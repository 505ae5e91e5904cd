//! # Core Domain Entities
//!
//! ## Clusters
//!
//! - **Identity**: `PublicKey`, `Pseudonym`, `OwnerToken`, `OwnerCommitment`, `Registration`
//! - **Mailbox**: `Envelope`, `EnvelopeId`, `StoredEnvelope`, `Tombstone`, `LogEntry`
//! - **Networking**: `NodeId`
//!
//! Byte fields serialize as lowercase hex so the JSON surface stays readable.

use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::errors::RelayError;
use crate::fingerprint::Fingerprint;

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// Maximum pseudonym length in characters.
pub const MAX_PSEUDONYM_LEN: usize = 32;

/// Maximum owner token length in bytes.
pub const MAX_OWNER_TOKEN_LEN: usize = 256;

const OWNER_COMMITMENT_DOMAIN: &[u8] = b"mailbox-relay/owner/v1";

// =============================================================================
// CLUSTER A: IDENTITY
// =============================================================================

/// Unique identifier of a relay node.
#[serde_as]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct NodeId(#[serde_as(as = "Hex")] pub [u8; 16]);

impl NodeId {
    /// Fresh random node id (UUID v4 bytes).
    pub fn random() -> Self {
        Self(*uuid::Uuid::new_v4().as_bytes())
    }

    /// Parse a hex or UUID-formatted node id.
    pub fn parse(s: &str) -> Result<Self, RelayError> {
        uuid::Uuid::parse_str(s)
            .map(|u| Self(*u.as_bytes()))
            .map_err(|e| RelayError::InvalidInput(format!("invalid node id: {}", e)))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", &hex::encode(self.0)[..8])
    }
}

/// Opaque public key bytes supplied by the registrant.
#[serde_as]
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey(#[serde_as(as = "Hex")] Vec<u8>);

impl PublicKey {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({} bytes)", self.0.len())
    }
}

/// Human-chosen mailbox alias.
///
/// 1 to [`MAX_PSEUDONYM_LEN`] characters from `[A-Za-z0-9_.-]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pseudonym(String);

impl Pseudonym {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Pseudonym {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.chars().count() > MAX_PSEUDONYM_LEN {
            return Err(RelayError::InvalidInput(format!(
                "pseudonym must be 1..={} characters",
                MAX_PSEUDONYM_LEN
            )));
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        {
            return Err(RelayError::InvalidInput(format!(
                "pseudonym {:?} contains characters outside [A-Za-z0-9_.-]",
                s
            )));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for Pseudonym {
    type Error = RelayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Pseudonym> for String {
    fn from(p: Pseudonym) -> Self {
        p.0
    }
}

impl fmt::Display for Pseudonym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Secret capability chosen at registration. Never stored or logged.
#[serde_as]
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerToken(#[serde_as(as = "Hex")] Vec<u8>);

impl OwnerToken {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Reject empty or oversized tokens.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.0.is_empty() {
            return Err(RelayError::InvalidInput("owner token is empty".into()));
        }
        if self.0.len() > MAX_OWNER_TOKEN_LEN {
            return Err(RelayError::InvalidInput(format!(
                "owner token exceeds {} bytes",
                MAX_OWNER_TOKEN_LEN
            )));
        }
        Ok(())
    }

    /// The commitment stored in place of the token.
    pub fn commitment(&self) -> OwnerCommitment {
        OwnerCommitment::from_token(self)
    }
}

impl fmt::Debug for OwnerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OwnerToken(<redacted>)")
    }
}

/// SHA-256 commitment to an owner token.
#[serde_as]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerCommitment(#[serde_as(as = "Hex")] pub [u8; 32]);

impl OwnerCommitment {
    pub fn from_token(token: &OwnerToken) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(OWNER_COMMITMENT_DOMAIN);
        hasher.update(token.as_bytes());
        Self(hasher.finalize().into())
    }

    /// Check whether `token` opens this commitment.
    pub fn verify(&self, token: &OwnerToken) -> bool {
        Self::from_token(token) == *self
    }
}

impl fmt::Debug for OwnerCommitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OwnerCommitment({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

/// A live pseudonym binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub pseudonym: Pseudonym,
    pub public_key: PublicKey,
    pub fingerprint: Fingerprint,
    /// Commitment to the owner token; only this owner may mutate the binding.
    pub owner: OwnerCommitment,
    /// When the current owner first claimed the pseudonym.
    pub claimed_at: Timestamp,
    /// Last re-registration or removal.
    pub updated_at: Timestamp,
    /// Node that accepted the last change.
    pub origin: NodeId,
}

// =============================================================================
// CLUSTER B: MAILBOX
// =============================================================================

/// Global identity of an envelope: the accepting node and its per-node counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EnvelopeId {
    pub origin: NodeId,
    pub origin_seq: u64,
}

/// One stored encrypted message. Immutable once appended.
#[serde_as]
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: EnvelopeId,
    /// Opaque authentication token of the submitter (not the recipient).
    #[serde_as(as = "Hex")]
    pub sender: Vec<u8>,
    #[serde_as(as = "Hex")]
    pub ciphertext: Vec<u8>,
    /// Insertion time at the accepting node.
    pub inserted_at: Timestamp,
}

impl Envelope {
    /// Cross-origin display order: `(inserted_at, origin, origin_seq)`.
    pub fn display_key(&self) -> (Timestamp, NodeId, u64) {
        (self.inserted_at, self.id.origin, self.id.origin_seq)
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("id", &self.id)
            .field("sender_len", &self.sender.len())
            .field("ciphertext_len", &self.ciphertext.len())
            .field("inserted_at", &self.inserted_at)
            .finish()
    }
}

/// An envelope together with the local sequence number of the node holding it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEnvelope {
    pub sequence: u64,
    pub envelope: Envelope,
}

/// Replicated deletion marker.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tombstone {
    pub fingerprint: Fingerprint,
    pub target: EnvelopeId,
    /// Owner that held the mailbox when the deletion was issued.
    pub owner: OwnerCommitment,
    /// Owner-derived proof binding the deletion to the mailbox owner.
    #[serde_as(as = "Hex")]
    pub proof: [u8; 32],
    pub deleted_at: Timestamp,
}

/// Item carried by a mailbox log slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncItem {
    Envelope(Envelope),
    Tombstone(Tombstone),
}

/// One slot of a mailbox log, in local sequence order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub sequence: u64,
    pub item: SyncItem,
}
