//! License payload encryption using AES-256-GCM.
//!
//! Provides authenticated encryption; decryption fails closed on any
//! tag mismatch and never returns partially-decrypted data.

use crate::error::{CryptoError, CryptoResult};
use crate::key::{DerivedKey, SALT_SIZE};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Size of nonce in bytes (96 bits for AES-GCM).
pub const NONCE_SIZE: usize = 12;

/// Size of the authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Blob layout flag: a salt follows the nonce.
const FLAG_HAS_SALT: u8 = 0x01;

/// Encrypted data together with everything needed to decrypt it
/// (given the right key).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EncryptedBlob {
    /// The nonce used for encryption (unique per encryption).
    pub nonce: [u8; NONCE_SIZE],
    /// Salt for key derivation, present on the random-salt path.
    /// The passphrase path derives its salt deterministically and omits it.
    pub salt: Option<[u8; SALT_SIZE]>,
    /// The encrypted ciphertext (auth tag appended).
    pub ciphertext: Vec<u8>,
}

impl EncryptedBlob {
    /// Encodes to base64 for embedding in a license envelope.
    ///
    /// Layout: `flags(1) || nonce(12) || salt(16)? || ciphertext`.
    pub fn to_base64(&self) -> String {
        use base64::{engine::general_purpose::STANDARD, Engine};
        let salt_len = if self.salt.is_some() { SALT_SIZE } else { 0 };
        let mut bytes = Vec::with_capacity(1 + NONCE_SIZE + salt_len + self.ciphertext.len());
        bytes.push(if self.salt.is_some() { FLAG_HAS_SALT } else { 0 });
        bytes.extend_from_slice(&self.nonce);
        if let Some(salt) = &self.salt {
            bytes.extend_from_slice(salt);
        }
        bytes.extend_from_slice(&self.ciphertext);
        STANDARD.encode(&bytes)
    }

    /// Decodes from base64.
    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        use base64::{engine::general_purpose::STANDARD, Engine};
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| CryptoError::Format(format!("invalid base64: {e}")))?;

        if bytes.is_empty() {
            return Err(CryptoError::Format("empty blob".to_string()));
        }

        let flags = bytes[0];
        let has_salt = flags & FLAG_HAS_SALT != 0;
        let header_len = 1 + NONCE_SIZE + if has_salt { SALT_SIZE } else { 0 };

        if bytes.len() < header_len + TAG_SIZE {
            return Err(CryptoError::Format("blob too short".to_string()));
        }

        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&bytes[1..1 + NONCE_SIZE]);

        let salt = if has_salt {
            let mut s = [0u8; SALT_SIZE];
            s.copy_from_slice(&bytes[1 + NONCE_SIZE..header_len]);
            Some(s)
        } else {
            None
        };

        Ok(Self {
            nonce,
            salt,
            ciphertext: bytes[header_len..].to_vec(),
        })
    }
}

/// Encrypts plaintext using AES-256-GCM with a fresh random nonce.
pub fn encrypt(key: &DerivedKey, plaintext: &[u8]) -> CryptoResult<EncryptedBlob> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    Ok(EncryptedBlob {
        nonce: nonce_bytes,
        salt: None,
        ciphertext,
    })
}

/// Decrypts a blob using AES-256-GCM.
///
/// Fails closed: a wrong key or any modification of the ciphertext or
/// tag yields `CryptoError::Decryption` with no plaintext.
pub fn decrypt(key: &DerivedKey, blob: &EncryptedBlob) -> CryptoResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let nonce = Nonce::from_slice(&blob.nonce);

    cipher
        .decrypt(nonce, blob.ciphertext.as_ref())
        .map_err(|_| CryptoError::Decryption)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::generate_random_key;

    #[test]
    fn roundtrip() {
        let key = generate_random_key();
        let blob = encrypt(&key, b"license payload").unwrap();
        assert_eq!(decrypt(&key, &blob).unwrap(), b"license payload");
    }

    #[test]
    fn wrong_key_fails() {
        let blob = encrypt(&generate_random_key(), b"data").unwrap();
        assert!(matches!(
            decrypt(&generate_random_key(), &blob),
            Err(CryptoError::Decryption)
        ));
    }

    #[test]
    fn base64_roundtrip_with_salt() {
        let key = generate_random_key();
        let mut blob = encrypt(&key, b"data").unwrap();
        blob.salt = Some([7u8; SALT_SIZE]);
        let decoded = EncryptedBlob::from_base64(&blob.to_base64()).unwrap();
        assert_eq!(decoded, blob);
        assert_eq!(decrypt(&key, &decoded).unwrap(), b"data");
    }

    #[test]
    fn truncated_blob_is_format_error() {
        assert!(matches!(
            EncryptedBlob::from_base64("AAEC"),
            Err(CryptoError::Format(_))
        ));
    }
}
