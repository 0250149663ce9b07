//! License codec for Keyward.
//!
//! This crate owns all cryptography in the engine:
//! - AES-256-GCM authenticated encryption of license payloads
//! - Argon2id key derivation from passphrases (PBKDF2 fallback)
//! - Ed25519 signing/verification of plaintext license serializations
//! - HMAC-SHA256 signing of validation wire messages
//!
//! # Sign-then-encrypt
//!
//! License envelopes are signed over the *plaintext* serialization and
//! then encrypted. Signature validity is therefore independent of the
//! symmetric key, and a successful decrypt followed by a failed signature
//! check is treated as possible forgery — strictly worse than a decrypt
//! failure — and short-circuits before any business-rule evaluation.

mod activation;
mod cipher;
mod envelope;
mod error;
mod key;
mod signer;
mod wire;

pub use activation::{ActivationClaims, ActivationKey};
pub use cipher::{decrypt, encrypt, EncryptedBlob, NONCE_SIZE, TAG_SIZE};
pub use envelope::{open, seal, ENVELOPE_ALGORITHM, ENVELOPE_VERSION};
pub use error::{CryptoError, CryptoResult};
pub use key::{
    derive_key, derive_key_pbkdf2, deterministic_salt, generate_random_key, DerivedKey,
    KdfParams, Salt, KEY_SIZE, SALT_SIZE,
};
pub use signer::{LicenseKeypair, Signature, SigningKey, VerifyingKey};
pub use wire::{sign_canonical, verify_canonical};
