//! Error types for the Ancalagon orchestrator.
//!
//! Orchestrator-level failures (bad configuration, unreadable files, internal
//! bugs) use [`AncalagonError`]. Failures that belong to one analyzer run are
//! expressed as [`crate::core::errors::AnalyzerError`] instead and end up in
//! that analyzer's report.

use thiserror::Error;

/// Main error type for Ancalagon operations.
#[derive(Debug, Error)]
pub enum AncalagonError {
    /// Configuration could not be loaded or failed validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation timeout
    #[error("Operation timeout after {seconds}s")]
    Timeout { seconds: u64 },

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Ancalagon operations
pub type Result<T> = std::result::Result<T, AncalagonError>;
