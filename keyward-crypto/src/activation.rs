//! Activation key parsing and verification.
//!
//! Activation keys are the short strings users type before a full
//! `License` has been fetched from the server. The format is
//! `base64url(payload).base64url(signature)`, where the payload is a
//! JSON claims object and the Ed25519 signature covers the
//! base64url-encoded payload string (not the decoded JSON), matching
//! the server implementation.

use crate::error::{CryptoError, CryptoResult};
use crate::signer::{SigningKey, VerifyingKey};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use keyward_types::SubscriptionTier;
use serde::{Deserialize, Serialize};

/// The claims carried inside an activation key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationClaims {
    /// Owning user ID.
    pub user_id: String,
    /// Subscription tier the key grants.
    pub tier: SubscriptionTier,
    /// Product the key is valid for.
    pub product_id: String,
    /// Issued-at timestamp (seconds since epoch).
    pub iat: i64,
}

/// A parsed and signature-verified activation key.
#[derive(Debug, Clone)]
pub struct ActivationKey {
    raw: String,
    claims: ActivationClaims,
}

impl ActivationKey {
    /// Parses and verifies an activation key string.
    ///
    /// Structural problems (wrong part count, bad base64, bad JSON) are
    /// `Format` errors; a well-formed key whose signature does not
    /// verify is `SignatureInvalid`.
    pub fn parse(key: &str, verifying_key: &VerifyingKey) -> CryptoResult<Self> {
        let key = key.trim();

        let Some((payload_b64, signature_b64)) = key.split_once('.') else {
            return Err(CryptoError::Format(
                "activation key must have two dot-separated parts".to_string(),
            ));
        };
        if signature_b64.contains('.') {
            return Err(CryptoError::Format(
                "activation key must have exactly two parts".to_string(),
            ));
        }

        let signature_hex = hex::encode(
            URL_SAFE_NO_PAD
                .decode(signature_b64)
                .map_err(|e| CryptoError::Format(format!("signature base64: {e}")))?,
        );

        // The signature covers the encoded payload string, so it can be
        // checked before the payload is decoded at all.
        verifying_key
            .verify_hex(payload_b64.as_bytes(), &signature_hex)
            .map_err(|_| CryptoError::SignatureInvalid)?;

        let payload_json = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|e| CryptoError::Format(format!("payload base64: {e}")))?;
        let claims: ActivationClaims = serde_json::from_slice(&payload_json)
            .map_err(|e| CryptoError::Format(format!("payload JSON: {e}")))?;

        Ok(Self {
            raw: key.to_string(),
            claims,
        })
    }

    /// Encodes and signs an activation key. The issuing side of
    /// `parse`; used by provisioning tooling and tests.
    #[must_use]
    pub fn encode(claims: &ActivationClaims, signing_key: &SigningKey) -> String {
        let payload_json = serde_json::to_vec(claims).expect("claims serialize");
        let payload_b64 = URL_SAFE_NO_PAD.encode(payload_json);
        let signature = signing_key.sign(payload_b64.as_bytes());
        let signature_b64 = URL_SAFE_NO_PAD.encode(signature.to_bytes());
        format!("{payload_b64}.{signature_b64}")
    }

    /// The raw key string as typed.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The verified claims.
    #[must_use]
    pub fn claims(&self) -> &ActivationClaims {
        &self.claims
    }
}
