//! Error types for the tamper module.

use thiserror::Error;

/// Tamper-monitor errors.
#[derive(Debug, Error)]
pub enum TamperError {
    /// Baseline file could not be read or written.
    #[error("baseline storage error: {0}")]
    BaselineStorage(String),

    /// A critical file could not be hashed at capture time.
    #[error("cannot hash {path}: {reason}")]
    Unhashable { path: String, reason: String },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for tamper operations.
pub type TamperResult<T> = Result<T, TamperError>;
