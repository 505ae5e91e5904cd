//! Ports (hexagonal boundaries) for the Registry.

pub mod inbound;
