//! # Registry Subsystem (mr-01)
//!
//! Binds human-chosen pseudonyms to public keys and their fingerprints.
//!
//! ## Architecture Role
//!
//! ```text
//! [Node Service] ──register/resolve/unregister──→ [Registry]
//!                                                     │ owner_of(fingerprint)
//!                                                     ↓
//!                                              [Mailbox Store] (delete auth)
//!
//! [Replication] ──changes_since / merge──→ [Registry]
//! ```
//!
//! ## Ownership
//!
//! A registration is owned by whoever knows the owner token presented when it
//! was created. The node stores only the token's commitment.

pub mod domain;
pub mod ports;
pub mod service;

pub use domain::*;
pub use ports::inbound::RegistryApi;
pub use service::RegistryService;
