//! # Domain Layer for the Node Service
//!
//! - **config**: request limits and deadlines
//! - **error**: `ApiError`, the structured wire error, and its HTTP status
//! - **types**: client request and response bodies
//! - **validation**: request checks run before any state is touched

mod config;
mod error;
mod types;
mod validation;

pub use config::*;
pub use error::*;
pub use types::*;
pub use validation::*;
