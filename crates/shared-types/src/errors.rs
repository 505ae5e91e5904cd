//! # Error Types
//!
//! The error taxonomy shared by every subsystem. Registry and mailbox
//! operations fail fast with one of these and leave state unchanged.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by relay operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// Public key missing or malformed.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Request field failed validation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Pseudonym is bound to a different live owner.
    #[error("Pseudonym taken: {0}")]
    PseudonymTaken(String),

    /// Pseudonym, mailbox or peer does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Owner token does not match the registered owner.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Index past the mailbox head, deleted, or not an envelope slot.
    #[error("Index out of range: {index}")]
    IndexOutOfRange { index: u64 },

    /// Live envelope count reached the configured cap.
    #[error("Mailbox full: {count} envelopes (cap: {cap})")]
    MailboxFull { count: usize, cap: usize },

    /// Caller deadline or peer session elapsed.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Peer did not answer.
    #[error("Peer unreachable: {0}")]
    PeerUnreachable(String),

    /// Raised only at the external cipher boundary.
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Persistence backend failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Unexpected internal failure (e.g. a worker task panicked).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// The serializable discriminant of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RelayError::InvalidKey(_) => ErrorKind::InvalidKey,
            RelayError::InvalidInput(_) => ErrorKind::InvalidInput,
            RelayError::PseudonymTaken(_) => ErrorKind::PseudonymTaken,
            RelayError::NotFound(_) => ErrorKind::NotFound,
            RelayError::Unauthorized(_) => ErrorKind::Unauthorized,
            RelayError::IndexOutOfRange { .. } => ErrorKind::IndexOutOfRange,
            RelayError::MailboxFull { .. } => ErrorKind::MailboxFull,
            RelayError::Timeout(_) => ErrorKind::Timeout,
            RelayError::PeerUnreachable(_) => ErrorKind::PeerUnreachable,
            RelayError::Crypto(_) => ErrorKind::CryptoError,
            RelayError::Storage(_) => ErrorKind::Storage,
            RelayError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Error discriminant carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidKey,
    InvalidInput,
    PseudonymTaken,
    NotFound,
    Unauthorized,
    IndexOutOfRange,
    MailboxFull,
    Timeout,
    PeerUnreachable,
    CryptoError,
    Storage,
    Internal,
}
