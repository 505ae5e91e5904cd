//! # Replication Subsystem (mr-03)
//!
//! Eventually consistent replication of mailboxes and registry records
//! between relay nodes, with no coordinator and no global lock.
//!
//! ## Architecture Role
//!
//! ```text
//!            Advertise(heads, registry revision)
//!  [Node A] ─────────────────────────────────────→ [Node B]
//!     ↑                                               │ queue fingerprints
//!     │        PullRegistry(since) / PullSince(fp, since)   ahead of high-water
//!     └───────────────────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! | Property | Mechanism |
//! |----------|-----------|
//! | No duplication | Envelopes de-duplicated by `(origin, origin_seq)` |
//! | No loss | Per-peer high-water marks only advance over merged entries |
//! | No resurrection | Tombstones kept even when they precede their envelope |
//! | Same display order | `(inserted_at, origin, origin_seq)` on every node |
//! | Backpressure | Bounded drop-oldest queue per peer |
//! | Isolation | Peer failures back off and never reach clients |
//!
//! ## Crate Structure (Hexagonal Architecture)
//!
//! - `domain/` - messages, peer state, backoff, bounded queue
//! - `ports/` - peer-facing and node-facing inbound APIs, transport outbound port
//! - `service.rs` - sessions, merge, background loops

pub mod domain;
pub mod ports;
pub mod service;

pub use domain::*;
pub use ports::inbound::{PeerSyncApi, ReplicationApi};
pub use ports::outbound::{LoopbackTransport, PeerTransport};
pub use service::{ReplicationService, ReplicationStats, SessionReport};
