//! Error types for pathtune

use thiserror::Error;

/// Engine error type
///
/// Measurement failures are never errors: they are recorded as
/// [`ProbeOutcome`](crate::ProbeOutcome) values. These variants cover
/// programmer mistakes and broken configuration.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Rejected before any probing started
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Application catalog could not be loaded
    #[error("catalog error: {0}")]
    Catalog(String),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// Apply collaborator failed
    #[error("apply failed: {0}")]
    Apply(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

/// Result type for pathtune
pub type EngineResult<T> = Result<T, EngineError>;
