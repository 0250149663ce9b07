//! Ed25519 signing and verification for license envelopes.
//!
//! A keypair is generated once per installation and persisted as
//! `private.pem`/`public.pem` under the application data directory. The
//! private key never leaves local storage; the public key may be
//! distributed so third parties can validate issued licenses.

use ed25519_dalek::{
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey},
    Signature as DalekSignature, Signer as _, SigningKey as DalekSigningKey,
    Verifier as _, VerifyingKey as DalekVerifyingKey,
};
use pkcs8::LineEnding;
use rand::rngs::OsRng;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::error::{CryptoError, CryptoResult};

/// Filename of the persisted private key.
pub const PRIVATE_KEY_FILE: &str = "private.pem";

/// Filename of the persisted public key.
pub const PUBLIC_KEY_FILE: &str = "public.pem";

/// Ed25519 signing key (secret). Signs plaintext license serializations.
pub struct SigningKey(DalekSigningKey);

/// Ed25519 verifying key (public).
#[derive(Clone)]
pub struct VerifyingKey(DalekVerifyingKey);

/// Ed25519 signature bytes.
pub struct Signature(DalekSignature);

/// A persisted keypair for sealing and validating licenses.
pub struct LicenseKeypair {
    pub signing_key: SigningKey,
    pub verifying_key: VerifyingKey,
}

impl LicenseKeypair {
    /// Generates a new random Ed25519 keypair.
    pub fn generate() -> Self {
        let signing = DalekSigningKey::generate(&mut OsRng);
        let verifying = signing.verifying_key();
        Self {
            signing_key: SigningKey(signing),
            verifying_key: VerifyingKey(verifying),
        }
    }

    /// Loads the keypair from `dir`, generating and persisting a fresh one
    /// on first run.
    pub fn load_or_generate(dir: &Path) -> CryptoResult<Self> {
        let private_path = dir.join(PRIVATE_KEY_FILE);
        if private_path.exists() {
            return Self::load(dir);
        }

        info!(dir = %dir.display(), "no keypair found, generating");
        let keypair = Self::generate();
        keypair.persist(dir)?;
        Ok(keypair)
    }

    /// Loads the keypair from `private.pem` in `dir`.
    pub fn load(dir: &Path) -> CryptoResult<Self> {
        let pem = fs::read_to_string(dir.join(PRIVATE_KEY_FILE))
            .map_err(|e| CryptoError::KeyStorage(format!("read private key: {e}")))?;

        let signing = DalekSigningKey::from_pkcs8_pem(&pem)
            .map_err(|e| CryptoError::KeyStorage(format!("parse private key: {e}")))?;
        let verifying = signing.verifying_key();

        Ok(Self {
            signing_key: SigningKey(signing),
            verifying_key: VerifyingKey(verifying),
        })
    }

    /// Writes `private.pem` and `public.pem` into `dir`.
    pub fn persist(&self, dir: &Path) -> CryptoResult<()> {
        fs::create_dir_all(dir)
            .map_err(|e| CryptoError::KeyStorage(format!("create key dir: {e}")))?;

        let private_pem = self
            .signing_key
            .0
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| CryptoError::KeyStorage(format!("encode private key: {e}")))?;
        let public_pem = self
            .verifying_key
            .0
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::KeyStorage(format!("encode public key: {e}")))?;

        fs::write(dir.join(PRIVATE_KEY_FILE), private_pem.as_bytes())
            .map_err(|e| CryptoError::KeyStorage(format!("write private key: {e}")))?;
        fs::write(dir.join(PUBLIC_KEY_FILE), public_pem.as_bytes())
            .map_err(|e| CryptoError::KeyStorage(format!("write public key: {e}")))?;

        Ok(())
    }
}

impl SigningKey {
    /// Creates a signing key from a raw 32-byte secret.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self(DalekSigningKey::from_bytes(bytes))
    }

    /// Signs a message and returns the signature.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.0.sign(message))
    }

    /// Signs a message and returns the signature hex-encoded.
    pub fn sign_hex(&self, message: &[u8]) -> String {
        hex::encode(self.0.sign(message).to_bytes())
    }

    /// Returns the corresponding verifying key.
    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey(self.0.verifying_key())
    }
}

impl VerifyingKey {
    /// Creates a verifying key from a raw 32-byte public key.
    pub fn from_bytes(bytes: &[u8; 32]) -> CryptoResult<Self> {
        DalekVerifyingKey::from_bytes(bytes)
            .map(Self)
            .map_err(|_| CryptoError::Format("invalid public key".to_string()))
    }

    /// Loads a verifying key from `public.pem` in `dir`.
    pub fn load(dir: &Path) -> CryptoResult<Self> {
        let pem = fs::read_to_string(dir.join(PUBLIC_KEY_FILE))
            .map_err(|e| CryptoError::KeyStorage(format!("read public key: {e}")))?;
        DalekVerifyingKey::from_public_key_pem(&pem)
            .map(Self)
            .map_err(|e| CryptoError::KeyStorage(format!("parse public key: {e}")))
    }

    /// Returns the raw 32-byte public key.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Verifies a signature against a message.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> CryptoResult<()> {
        self.0
            .verify(message, &signature.0)
            .map_err(|_| CryptoError::SignatureInvalid)
    }

    /// Verifies a hex-encoded signature against a message.
    pub fn verify_hex(&self, message: &[u8], signature_hex: &str) -> CryptoResult<()> {
        let bytes = hex::decode(signature_hex)
            .map_err(|_| CryptoError::Format("invalid signature hex".to_string()))?;
        let sig_bytes: [u8; 64] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::Format("invalid signature length".to_string()))?;
        self.verify(message, &Signature(DalekSignature::from_bytes(&sig_bytes)))
    }
}

impl Signature {
    /// Creates a signature from a raw 64-byte value.
    pub fn from_bytes(bytes: &[u8; 64]) -> Self {
        Self(DalekSignature::from_bytes(bytes))
    }

    /// Returns the raw 64-byte signature.
    pub fn to_bytes(&self) -> [u8; 64] {
        self.0.to_bytes()
    }
}
