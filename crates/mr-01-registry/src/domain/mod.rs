//! # Domain Layer for the Registry
//!
//! Pure record types and the replication merge policy. No locking, no I/O.
//!
//! ## Contents
//!
//! - **entities**: `RegistryRecord`, `RegistryChanges`
//! - **merge**: deterministic conflict resolution between two records

mod entities;
mod merge;

pub use entities::*;
pub use merge::*;
