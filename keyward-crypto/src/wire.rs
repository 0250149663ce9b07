//! HMAC-SHA256 signing of validation wire messages.
//!
//! Requests and responses on `/api/v1/validate` are signed over a
//! canonical field ordering using the server API key. Verification uses
//! the Mac's built-in constant-time comparison.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{CryptoError, CryptoResult};

type HmacSha256 = Hmac<Sha256>;

/// Signs the canonical fields, returning a hex HMAC tag.
///
/// Fields are joined with `\n` in the order given; callers on both sides
/// must agree on that order.
pub fn sign_canonical(api_key: &[u8], fields: &[&str]) -> CryptoResult<String> {
    let mut mac = HmacSha256::new_from_slice(api_key)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    mac.update(canonical(fields).as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verifies a hex HMAC tag over the canonical fields in constant time.
pub fn verify_canonical(api_key: &[u8], fields: &[&str], tag_hex: &str) -> CryptoResult<()> {
    let tag = hex::decode(tag_hex)
        .map_err(|_| CryptoError::Format("invalid signature hex".to_string()))?;

    let mut mac = HmacSha256::new_from_slice(api_key)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    mac.update(canonical(fields).as_bytes());
    mac.verify_slice(&tag)
        .map_err(|_| CryptoError::SignatureInvalid)
}

fn canonical(fields: &[&str]) -> String {
    fields.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let key = b"server-api-key";
        let fields = ["KEY-123", "fp-abc", "studio", "1700000000"];
        let tag = sign_canonical(key, &fields).unwrap();
        assert!(verify_canonical(key, &fields, &tag).is_ok());
    }

    #[test]
    fn field_order_matters() {
        let key = b"server-api-key";
        let tag = sign_canonical(key, &["a", "b"]).unwrap();
        assert!(verify_canonical(key, &["b", "a"], &tag).is_err());
    }

    #[test]
    fn wrong_key_rejected() {
        let tag = sign_canonical(b"key-1", &["a"]).unwrap();
        assert!(matches!(
            verify_canonical(b"key-2", &["a"], &tag),
            Err(CryptoError::SignatureInvalid)
        ));
    }
}
