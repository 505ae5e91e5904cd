//! # Subsystem Container
//!
//! Configuration and construction of every subsystem of one node.
//!
//! - Subsystems are built in dependency order (identity → registry → store →
//!   replication → node service)
//! - Adapters from `crate::adapters` fill the outbound ports

pub mod config;
pub mod subsystems;

pub use config::{
    ConfigError, LoggingConfig, MailboxConfig, NetworkConfig, NodeConfig, StorageBackend,
    StorageConfig,
};
pub use subsystems::{NodeReplication, SubsystemContainer};
