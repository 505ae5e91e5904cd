//! # Mailbox Store Subsystem (mr-02)
//!
//! Holds encrypted envelopes addressed by recipient fingerprint. The node
//! never inspects ciphertext; it only orders, counts and deletes it.
//!
//! ## Architecture Role
//!
//! ```text
//! [Node Service] ──append/get/fetch/delete──→ [Mailbox Store] ──persist──→ [Record File]
//!                                                  ↑      │
//!                                 merge_* / entries_since │ owner_of / owner_history
//!                                                  │      ↓
//!                                           [Replication]  [Registry]
//! ```
//!
//! ## Domain Invariants
//!
//! | Invariant | Description |
//! |-----------|-------------|
//! | Monotonic sequences | Local sequence numbers start at 0 and are never reused |
//! | Logical deletion | Deletes write tombstones; remaining sequences stay valid |
//! | No resurrection | A tombstone received before its envelope suppresses it |
//! | Bounded mailbox | Client appends fail with `MailboxFull` at the cap |
//! | Owner-only deletion | Deletes require the token whose commitment owns the fingerprint |
//! | Durable deletions | A tombstone verifies against any past owner of its fingerprint |
//! | Bounded history | Compaction forgets tombstones past the retention horizon, never the head |
//!
//! ## Crate Structure (Hexagonal Architecture)
//!
//! - `domain/` - mailbox log, tombstone proofs, limits
//! - `ports/` - inbound API, outbound owner directory and persistence
//! - `service.rs` - sharded, per-mailbox locked implementation

pub mod domain;
pub mod ports;
pub mod service;

pub use domain::{issue_tombstone, tombstone_proof, verify_tombstone, Mailbox, StoreConfig};
pub use ports::inbound::MailboxStoreApi;
pub use ports::outbound::{
    FileBackedPersistence, InMemoryPersistence, MailboxPersistence, OwnerDirectory,
    PersistedEntry,
};
pub use service::MailboxStoreService;
