//! Key derivation and management.
//!
//! Uses Argon2id for deriving encryption keys from passphrases, with a
//! PBKDF2-HMAC-SHA256 fallback for environments where the memory-hard
//! derivation is too expensive.
//!
//! # Deterministic salt
//!
//! When a passphrase is supplied, the salt is derived deterministically
//! from the passphrase and a fixed context string, so the same passphrase
//! always yields the same key for a given license. This lets a license
//! file be decrypted self-contained, with no separate channel for the
//! salt. The cost is reduced rainbow-table resistance for the passphrase
//! path; this is a deliberate, documented trade-off, not an oversight.
//! The no-passphrase path uses a random salt carried inside the blob.

use crate::error::{CryptoError, CryptoResult};
use argon2::{Argon2, Params, Version};
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of encryption keys in bytes (256 bits for AES-256-GCM).
pub const KEY_SIZE: usize = 32;

/// Size of salt in bytes.
pub const SALT_SIZE: usize = 16;

/// Context string mixed into deterministic salts.
const SALT_CONTEXT: &[u8] = b"keyward-license-v1";

/// A derived encryption key with automatic zeroization on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    bytes: [u8; KEY_SIZE],
}

impl DerivedKey {
    /// Creates a new derived key from raw bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Returns the key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Salt for key derivation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Salt {
    bytes: [u8; SALT_SIZE],
}

impl Salt {
    /// Generates a random salt.
    pub fn random() -> Self {
        let mut bytes = [0u8; SALT_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Creates a salt from raw bytes.
    pub fn from_bytes(bytes: [u8; SALT_SIZE]) -> Self {
        Self { bytes }
    }

    /// Returns the salt bytes.
    pub fn as_bytes(&self) -> &[u8; SALT_SIZE] {
        &self.bytes
    }
}

/// Derives the deterministic salt for a passphrase.
///
/// `SHA-256(passphrase || 0x00 || context)[..16]` — see the module docs
/// for the trade-off this makes.
#[must_use]
pub fn deterministic_salt(passphrase: &str) -> Salt {
    let mut hasher = Sha256::new();
    hasher.update(passphrase.as_bytes());
    hasher.update([0u8]);
    hasher.update(SALT_CONTEXT);
    let digest = hasher.finalize();

    let mut bytes = [0u8; SALT_SIZE];
    bytes.copy_from_slice(&digest[..SALT_SIZE]);
    Salt::from_bytes(bytes)
}

/// Key derivation parameters.
#[derive(Clone, Debug)]
pub struct KdfParams {
    /// Memory cost in KiB (Argon2 only).
    pub memory_cost: u32,
    /// Time cost (Argon2 iterations).
    pub time_cost: u32,
    /// Parallelism factor (Argon2 only).
    pub parallelism: u32,
    /// Iteration count for the PBKDF2 fallback.
    pub pbkdf2_rounds: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        // OWASP recommendations for Argon2id; keeps derivation under a
        // second on typical end-user hardware.
        Self {
            memory_cost: 19 * 1024, // 19 MiB
            time_cost: 2,
            parallelism: 1,
            pbkdf2_rounds: 600_000,
        }
    }
}

impl KdfParams {
    /// Creates parameters for testing (fast but insecure).
    pub fn test() -> Self {
        Self {
            memory_cost: 1024, // 1 MiB
            time_cost: 1,
            parallelism: 1,
            pbkdf2_rounds: 1_000,
        }
    }
}

/// Derives an encryption key from a passphrase using Argon2id.
pub fn derive_key(passphrase: &str, salt: &Salt, params: &KdfParams) -> CryptoResult<DerivedKey> {
    let argon2_params = Params::new(
        params.memory_cost,
        params.time_cost,
        params.parallelism,
        Some(KEY_SIZE),
    )
    .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut key_bytes = [0u8; KEY_SIZE];
    argon2
        .hash_password_into(passphrase.as_bytes(), salt.as_bytes(), &mut key_bytes)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    Ok(DerivedKey::from_bytes(key_bytes))
}

/// Derives an encryption key using PBKDF2-HMAC-SHA256.
///
/// Fallback for hosts where Argon2's memory cost is unacceptable; the two
/// derivations produce different keys for the same inputs, so a given
/// license must be opened with the same KDF it was sealed with.
pub fn derive_key_pbkdf2(passphrase: &str, salt: &Salt, params: &KdfParams) -> DerivedKey {
    let mut key_bytes = [0u8; KEY_SIZE];
    pbkdf2::pbkdf2_hmac::<Sha256>(
        passphrase.as_bytes(),
        salt.as_bytes(),
        params.pbkdf2_rounds,
        &mut key_bytes,
    );
    DerivedKey::from_bytes(key_bytes)
}

/// Generates a random encryption key (for the no-passphrase path).
pub fn generate_random_key() -> DerivedKey {
    let mut bytes = [0u8; KEY_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    DerivedKey::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_salt_is_stable() {
        assert_eq!(deterministic_salt("pass"), deterministic_salt("pass"));
        assert_ne!(deterministic_salt("pass"), deterministic_salt("other"));
    }

    #[test]
    fn same_passphrase_same_key() {
        let params = KdfParams::test();
        let salt = deterministic_salt("correct horse");
        let a = derive_key("correct horse", &salt, &params).unwrap();
        let b = derive_key("correct horse", &salt, &params).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn kdfs_disagree() {
        let params = KdfParams::test();
        let salt = deterministic_salt("pass");
        let argon = derive_key("pass", &salt, &params).unwrap();
        let pbkdf = derive_key_pbkdf2("pass", &salt, &params);
        assert_ne!(argon.as_bytes(), pbkdf.as_bytes());
    }
}
