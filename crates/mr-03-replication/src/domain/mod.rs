//! # Domain Layer for Replication
//!
//! - **config**: intervals, batch sizes, backoff parameters
//! - **messages**: Advertise / PullSince / PullRegistry payloads
//! - **peer**: per-peer high-water marks, failure tracking, backoff
//! - **queue**: bounded drop-oldest fingerprint queue

mod config;
mod messages;
mod peer;
mod queue;

pub use config::*;
pub use messages::*;
pub use peer::*;
pub use queue::*;
