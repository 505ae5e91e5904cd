//! Adapters connecting the subsystems of one node.

pub mod owners;

pub use owners::RegistryOwnerDirectory;
