//! Error types for the trust module.

use thiserror::Error;

/// Trust-specific errors.
#[derive(Debug, Error)]
pub enum TrustError {
    /// The device has not been registered with the store.
    #[error("unknown device: {0}")]
    UnknownDevice(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for trust operations.
pub type TrustResult<T> = Result<T, TrustError>;
