//! # Domain Layer for the Mailbox Store
//!
//! - **mailbox**: the per-fingerprint log and its live view
//! - **tombstone**: owner-bound deletion proofs
//! - **config**: store limits

mod config;
mod mailbox;
mod tombstone;

pub use config::*;
pub use mailbox::*;
pub use tombstone::*;
