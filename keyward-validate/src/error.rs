//! Error types for license validation.
//!
//! Each error maps into the engine-wide taxonomy via `category()`;
//! `recoverable()` decides whether the failure can clear without user
//! action (reconnection, renewal) or is final (forgery, malformed data).

use keyward_crypto::CryptoError;
use thiserror::Error;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Engine-wide error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed license or envelope.
    Format,
    /// Decryption or signature failure — treated as possible forgery.
    Crypto,
    /// License, offline window, or grace period expired.
    Expiry,
    /// Seat, feature, or tier violation.
    Entitlement,
    /// Network failure or timeout.
    Connectivity,
    /// Tamper-response driven.
    Tamper,
}

/// Errors that can occur while validating a license.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Codec failure (envelope, key, or signature).
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The server response signature did not verify. A forged "valid"
    /// response must never be trusted.
    #[error("server response signature invalid")]
    ResponseSignature,

    /// Network-level failure reaching the validation server.
    #[error("network error: {0}")]
    Network(String),

    /// The validation request timed out. Treated identically to a
    /// network failure by the fallback chain.
    #[error("validation request timed out")]
    Timeout,

    /// Cache or offline-license persistence failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// The validator was shut down while a request was in flight.
    #[error("validator shut down")]
    Shutdown,

    /// A deduplicated concurrent validation failed; carries the
    /// leader's error.
    #[error("{0}")]
    InFlight(std::sync::Arc<ValidationError>),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ValidationError {
    /// Maps this error into the engine-wide taxonomy.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Crypto(CryptoError::Format(_)) => ErrorCategory::Format,
            Self::Crypto(_) | Self::ResponseSignature => ErrorCategory::Crypto,
            Self::Network(_) | Self::Timeout | Self::Shutdown => ErrorCategory::Connectivity,
            Self::Storage(_) | Self::Serialization(_) => ErrorCategory::Format,
            Self::InFlight(inner) => inner.category(),
        }
    }

    /// Whether the condition can clear without user intervention.
    /// Connectivity failures retry and fall back; crypto and format
    /// failures do not.
    #[must_use]
    pub fn recoverable(&self) -> bool {
        matches!(self.category(), ErrorCategory::Connectivity)
    }
}
