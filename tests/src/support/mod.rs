//! Fixtures shared by the scenarios and benchmarks.

pub mod cipher;
pub mod cluster;

pub use cipher::{EciesCipher, KeyPair};
pub use cluster::{Cluster, TestNode};
