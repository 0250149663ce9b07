//! Error types for the license codec.
//!
//! None of these are recoverable by retrying: a malformed envelope stays
//! malformed, and a wrong key or bad signature does not fix itself. The
//! validation layer maps them into its own taxonomy.

use thiserror::Error;

/// Result type for codec operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur in cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The envelope or blob is structurally malformed.
    #[error("malformed envelope: {0}")]
    Format(String),

    /// Key derivation failed.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Encryption failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Decryption failed (wrong key or tampered ciphertext/tag).
    #[error("decryption failed: wrong key or tampered data")]
    Decryption,

    /// A signature did not verify.
    #[error("signature verification failed")]
    SignatureInvalid,

    /// The payload decrypted cleanly but its signature did not verify.
    /// Possible forgery; must short-circuit all further evaluation.
    #[error("payload decrypted but signature invalid: possible forgery")]
    Forgery,

    /// Keypair persistence failed.
    #[error("key storage error: {0}")]
    KeyStorage(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
