//! Port definitions for replication.

pub mod inbound;
pub mod outbound;
