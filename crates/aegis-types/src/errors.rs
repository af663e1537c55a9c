//! Error types and conversions

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AegisError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Pattern store error: {0}")]
    PatternStore(String),

    #[error("Stage '{stage}' unavailable: {reason}")]
    StageUnavailable { stage: String, reason: String },

    #[error("Stage '{stage}' timed out after {timeout_ms}ms")]
    StageTimeout { stage: String, timeout_ms: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type AegisResult<T> = Result<T, AegisError>;
