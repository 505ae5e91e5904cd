//! # Node Service (mr-04)
//!
//! The client and peer surface of a relay node.
//!
//! ## Architecture Role
//!
//! ```text
//!           HTTP/JSON (axum)
//!                  │  TraceLayer, RequestBodyLimitLayer
//!                  ↓
//!            [NodeService]  validate → spawn_blocking → timeout(deadline)
//!             │    │    │
//!             ↓    │    ↓
//!     [Registry]   │   [Replication]  announce, peer routes
//!                  ↓
//!          [Mailbox Store]
//! ```
//!
//! ## Guarantees
//!
//! - Requests are validated before any subsystem is touched.
//! - A caller deadline yields `Timeout` without undoing a completed append.
//! - Every failure is a structured `{kind, message}`; no request can bring
//!   the node down.
//! - Ciphertext and owner tokens never reach the logs.

pub mod adapters;
pub mod domain;
pub mod metrics;
pub mod ports;
pub mod router;
pub mod service;

pub use adapters::RegistryOwnerDirectory;
pub use domain::*;
pub use metrics::{ServiceMetrics, ServiceStats};
pub use ports::inbound::NodeApi;
pub use router::{build_router, AppState};
pub use service::NodeService;
