//! Client request and response bodies.
//!
//! Byte fields travel as lowercase hex. Every request may carry
//! `deadline_ms`; an omitted deadline falls back to the configured default.

use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use std::fmt;

use mr_03_replication::{PeerStatus, ReplicationStats};
use shared_types::{Fingerprint, OwnerToken, Pseudonym, PublicKey, StoredEnvelope};

use crate::metrics::ServiceStats;

// =============================================================================
// REGISTRY
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub pseudonym: Pseudonym,
    pub public_key: PublicKey,
    pub owner_token: OwnerToken,
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub pseudonym: Pseudonym,
    pub fingerprint: Fingerprint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveResponse {
    pub pseudonym: Pseudonym,
    pub public_key: PublicKey,
    pub fingerprint: Fingerprint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnregisterRequest {
    pub pseudonym: Pseudonym,
    pub owner_token: OwnerToken,
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

// =============================================================================
// MAILBOX
// =============================================================================

/// Mailbox addressed by a `Send`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendTarget {
    Pseudonym(Pseudonym),
    Fingerprint(Fingerprint),
}

#[serde_as]
#[derive(Clone, Serialize, Deserialize)]
pub struct SendRequest {
    pub to: SendTarget,
    #[serde_as(as = "Hex")]
    pub ciphertext: Vec<u8>,
    /// Opaque submitter token, stored alongside the envelope.
    #[serde_as(as = "Hex")]
    #[serde(default)]
    pub sender: Vec<u8>,
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

impl fmt::Debug for SendRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendRequest")
            .field("to", &self.to)
            .field("ciphertext_len", &self.ciphertext.len())
            .field("sender_len", &self.sender.len())
            .field("deadline_ms", &self.deadline_ms)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResponse {
    pub fingerprint: Fingerprint,
    pub sequence: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountResponse {
    pub fingerprint: Fingerprint,
    pub count: usize,
}

/// Query string of `GET /v1/mailbox/:fingerprint`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchQuery {
    /// Position in display order to start from.
    #[serde(default)]
    pub from: usize,
    pub limit: Option<usize>,
    pub deadline_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResponse {
    pub fingerprint: Fingerprint,
    pub envelopes: Vec<StoredEnvelope>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteOneRequest {
    pub fingerprint: Fingerprint,
    /// Local sequence number as returned by `Send`.
    pub index: u64,
    pub owner_token: OwnerToken,
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteAllRequest {
    pub fingerprint: Fingerprint,
    pub owner_token: OwnerToken,
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub deleted: usize,
}

/// Empty success body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {}

/// Query string carrying only a deadline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadlineQuery {
    pub deadline_ms: Option<u64>,
}

// =============================================================================
// OPERATIONS
// =============================================================================

/// Body of `GET /v1/stats`.
#[derive(Debug, Clone, Serialize)]
pub struct NodeStats {
    pub node_id: String,
    pub mailboxes: usize,
    pub service: ServiceStats,
    pub replication: ReplicationStats,
    pub peers: Vec<PeerStatus>,
}
