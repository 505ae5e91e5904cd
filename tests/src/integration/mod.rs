//! Cross-subsystem scenarios.

pub mod convergence;
pub mod flows;
