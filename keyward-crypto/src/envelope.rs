//! License envelope sealing and opening.
//!
//! `seal` signs the plaintext license serialization, then encrypts it;
//! `open` decrypts, then verifies the signature against the recovered
//! plaintext. A payload that decrypts cleanly but fails verification is
//! a possible forgery and is rejected before any field of the license is
//! interpreted.

use crate::cipher::{decrypt, encrypt, EncryptedBlob};
use crate::error::{CryptoError, CryptoResult};
use crate::key::DerivedKey;
use crate::signer::{LicenseKeypair, VerifyingKey};
use keyward_types::{EncryptedLicensePayload, License};
use tracing::warn;

/// Current envelope format version.
pub const ENVELOPE_VERSION: &str = "1.2.0";

/// AEAD algorithm identifier written into envelopes.
pub const ENVELOPE_ALGORITHM: &str = "aes-256-gcm";

/// Seals a license into an encrypted, signed envelope.
pub fn seal(
    license: &License,
    key: &DerivedKey,
    keypair: &LicenseKeypair,
) -> CryptoResult<EncryptedLicensePayload> {
    let plaintext = serde_json::to_vec(license)?;
    let signature = keypair.signing_key.sign_hex(&plaintext);

    let blob = encrypt(key, &plaintext)?;

    Ok(EncryptedLicensePayload {
        signature,
        payload: blob.to_base64(),
        timestamp: chrono::Utc::now().timestamp_millis(),
        version: ENVELOPE_VERSION.to_string(),
        algorithm: ENVELOPE_ALGORITHM.to_string(),
    })
}

/// Opens a sealed envelope, returning the license.
///
/// # Errors
///
/// - `Format` if the envelope structure or algorithm is unrecognized
/// - `Decryption` if the key is wrong or the ciphertext/tag was modified
/// - `Forgery` if decryption succeeds but the signature does not verify
pub fn open(
    envelope: &EncryptedLicensePayload,
    key: &DerivedKey,
    verifying_key: &VerifyingKey,
) -> CryptoResult<License> {
    if envelope.algorithm != ENVELOPE_ALGORITHM {
        return Err(CryptoError::Format(format!(
            "unsupported algorithm: {}",
            envelope.algorithm
        )));
    }

    let blob = EncryptedBlob::from_base64(&envelope.payload)?;
    let plaintext = decrypt(key, &blob)?;

    // Signature covers the plaintext, pre-encryption. A mismatch here
    // with a clean decrypt means the envelope was re-sealed by someone
    // without the signing key.
    if verifying_key
        .verify_hex(&plaintext, &envelope.signature)
        .is_err()
    {
        warn!("envelope decrypted but signature invalid");
        return Err(CryptoError::Forgery);
    }

    Ok(serde_json::from_slice(&plaintext)?)
}
