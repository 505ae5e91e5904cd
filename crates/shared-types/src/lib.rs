//! # Shared Types Crate
//!
//! Entities, the fingerprint index and the error taxonomy used by every relay
//! subsystem.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: All cross-subsystem types are defined here.
//! - **Opaque Payloads**: Ciphertext is carried as bytes and never inspected.
//! - **Fingerprint Addressing**: A mailbox is addressed only by the
//!   [`Fingerprint`] of the recipient public key.

pub mod cipher;
pub mod entities;
pub mod errors;
pub mod fingerprint;
pub mod time;

pub use cipher::{CryptoError, MessageCipher};
pub use entities::*;
pub use errors::*;
pub use fingerprint::{fingerprint, Fingerprint, FINGERPRINT_LEN};
pub use time::{ManualTimeSource, SystemTimeSource, TimeSource};
