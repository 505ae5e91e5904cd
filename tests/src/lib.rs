//! # Mailbox Relay Test Suite
//!
//! Unified test crate containing:
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── support/          # Shared fixtures
//! │   ├── cipher.rs     # ECDH + AES-GCM message cipher
//! │   └── cluster.rs    # Full nodes over an in-process transport
//! │
//! ├── integration/      # Cross-subsystem scenarios
//! │   ├── flows.rs      # Client flows through the node service
//! │   └── convergence.rs# Multi-node replication
//! │
//! └── properties.rs     # proptest properties
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p mr-tests
//!
//! # By category
//! cargo test -p mr-tests integration::
//! cargo test -p mr-tests properties::
//!
//! # Benchmarks
//! cargo bench -p mr-tests
//! ```

pub mod integration;
pub mod properties;
pub mod support;
