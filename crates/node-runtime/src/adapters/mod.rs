//! # Adapter Implementations
//!
//! Concrete implementations of the outbound ports that only the executable
//! needs.
//!
//! ```text
//! [Replication] ──PeerTransport──→ HttpPeerTransport ──HTTP──→ peer /v1/peer/*
//! [Registry]    ←─load / save───── RegistrySnapshot  ──file──→ data_dir/registry.bin
//! [Container]   ──acquire─────────→ DataDirLock       ──flock─→ data_dir/LOCK
//! ```

pub mod data_dir_lock;
pub mod http_transport;
pub mod registry_snapshot;

pub use data_dir_lock::DataDirLock;
pub use http_transport::HttpPeerTransport;
pub use registry_snapshot::RegistrySnapshot;
