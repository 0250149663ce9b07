//! Error type for the arbiter. Mostly a roll-up of the component
//! errors; the arbiter itself adds only lifecycle failures.

use keyward_crypto::CryptoError;
use keyward_tamper::TamperError;
use keyward_trust::TrustError;
use keyward_validate::ValidationError;
use thiserror::Error;

/// Result type for arbiter operations.
pub type ArbiterResult<T> = Result<T, ArbiterError>;

/// Errors that can occur while orchestrating the engine.
#[derive(Debug, Error)]
pub enum ArbiterError {
    /// Validation state machine failure.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Codec or key-material failure.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Tamper monitor failure.
    #[error(transparent)]
    Tamper(#[from] TamperError),

    /// Trust store failure.
    #[error(transparent)]
    Trust(#[from] TrustError),

    /// No license key is known yet; `activate` must run first.
    #[error("no license key available; activate first")]
    NoLicenseKey,
}
