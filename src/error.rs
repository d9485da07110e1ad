use chrono::{DateTime, Utc};
use thiserror::Error;

/// Typed failures for the forecasting pipeline. The pipeline core always
/// fails loudly with one of these; only the HTTP boundary translates them
/// into degraded responses.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("input file not found: {path}")]
    NotFound { path: String },

    #[error("schema error: {0}")]
    Schema(String),

    #[error("parse error at row {row}: {message}")]
    Parse { row: usize, message: String },

    #[error("timestamp order violation: {0}")]
    Order(String),

    #[error("insufficient training data: {0}")]
    InsufficientData(String),

    #[error("no trained artifact available")]
    NoArtifact,

    #[error("feature shape mismatch: {0}")]
    Shape(String),

    #[error("artifact trained at {trained_at} exceeds the maximum age of {max_age_days} days")]
    StaleArtifact {
        trained_at: DateTime<Utc>,
        max_age_days: u32,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("artifact serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
