//! Port definitions for the node service.

pub mod inbound;
