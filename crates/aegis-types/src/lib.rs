//! Shared types and error types for the aegis content validator

pub mod errors;
pub mod types;

pub use errors::{AegisError, AegisResult};
pub use types::*;
