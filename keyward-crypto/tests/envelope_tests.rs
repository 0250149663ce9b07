mod common;

use common::sample_license;
use keyward_crypto::{
    decrypt, derive_key, deterministic_salt, encrypt, generate_random_key, open, seal,
    CryptoError, EncryptedBlob, KdfParams, LicenseKeypair, ENVELOPE_ALGORITHM,
};

// ── Seal / open ──────────────────────────────────────────────────

#[test]
fn seal_open_roundtrip() {
    let license = sample_license();
    let key = generate_random_key();
    let keypair = LicenseKeypair::generate();

    let envelope = seal(&license, &key, &keypair).unwrap();
    assert_eq!(envelope.algorithm, ENVELOPE_ALGORITHM);
    assert!(!envelope.signature.is_empty());

    let opened = open(&envelope, &key, &keypair.verifying_key).unwrap();
    assert_eq!(opened, license);
}

#[test]
fn seal_open_with_passphrase_key() {
    let license = sample_license();
    let params = KdfParams::test();
    let salt = deterministic_salt("hunter2");
    let key = derive_key("hunter2", &salt, &params).unwrap();
    let keypair = LicenseKeypair::generate();

    let envelope = seal(&license, &key, &keypair).unwrap();

    // Re-derive the key from the passphrase alone: deterministic salt
    // means no side channel is needed.
    let rederived = derive_key("hunter2", &deterministic_salt("hunter2"), &params).unwrap();
    let opened = open(&envelope, &rederived, &keypair.verifying_key).unwrap();
    assert_eq!(opened, license);
}

#[test]
fn wrong_symmetric_key_is_decryption_error() {
    let license = sample_license();
    let keypair = LicenseKeypair::generate();
    let envelope = seal(&license, &generate_random_key(), &keypair).unwrap();

    let result = open(&envelope, &generate_random_key(), &keypair.verifying_key);
    assert!(matches!(result, Err(CryptoError::Decryption)));
}

#[test]
fn reseal_by_stranger_is_forgery() {
    // An attacker who knows the symmetric key but not the signing key
    // re-seals a modified license. Decryption succeeds; the signature
    // check must catch it.
    let mut license = sample_license();
    let key = generate_random_key();
    let issuer = LicenseKeypair::generate();
    let attacker = LicenseKeypair::generate();

    license.max_seats = 9999;
    let forged = seal(&license, &key, &attacker).unwrap();

    let result = open(&forged, &key, &issuer.verifying_key);
    assert!(matches!(result, Err(CryptoError::Forgery)));
}

#[test]
fn unknown_algorithm_is_format_error() {
    let license = sample_license();
    let key = generate_random_key();
    let keypair = LicenseKeypair::generate();

    let mut envelope = seal(&license, &key, &keypair).unwrap();
    envelope.algorithm = "rot13".to_string();

    assert!(matches!(
        open(&envelope, &key, &keypair.verifying_key),
        Err(CryptoError::Format(_))
    ));
}

#[test]
fn garbage_payload_is_format_error() {
    let license = sample_license();
    let key = generate_random_key();
    let keypair = LicenseKeypair::generate();

    let mut envelope = seal(&license, &key, &keypair).unwrap();
    envelope.payload = "not base64 !!!".to_string();

    assert!(matches!(
        open(&envelope, &key, &keypair.verifying_key),
        Err(CryptoError::Format(_))
    ));
}

// ── Tamper evidence ──────────────────────────────────────────────

#[test]
fn ciphertext_bit_flip_fails_closed() {
    let key = generate_random_key();
    let mut blob = encrypt(&key, b"sensitive license data").unwrap();

    for i in 0..blob.ciphertext.len() {
        blob.ciphertext[i] ^= 0x01;
        assert!(decrypt(&key, &blob).is_err(), "flip at byte {i} accepted");
        blob.ciphertext[i] ^= 0x01;
    }
}

#[test]
fn nonce_bit_flip_fails_closed() {
    let key = generate_random_key();
    let mut blob = encrypt(&key, b"sensitive license data").unwrap();
    blob.nonce[0] ^= 0x80;
    assert!(decrypt(&key, &blob).is_err());
}

// ── Keypair persistence ──────────────────────────────────────────

#[test]
fn keypair_persists_and_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let first = LicenseKeypair::load_or_generate(dir.path()).unwrap();
    let second = LicenseKeypair::load_or_generate(dir.path()).unwrap();

    assert_eq!(
        first.verifying_key.to_bytes(),
        second.verifying_key.to_bytes()
    );
    assert!(dir.path().join("private.pem").exists());
    assert!(dir.path().join("public.pem").exists());
}

#[test]
fn signature_verifies_across_reload() {
    let dir = tempfile::tempdir().unwrap();
    let keypair = LicenseKeypair::load_or_generate(dir.path()).unwrap();
    let sig = keypair.signing_key.sign_hex(b"payload");

    let public = keyward_crypto::VerifyingKey::load(dir.path()).unwrap();
    assert!(public.verify_hex(b"payload", &sig).is_ok());
}

// ── Blob encoding ────────────────────────────────────────────────

#[test]
fn blob_base64_roundtrip() {
    let key = generate_random_key();
    let blob = encrypt(&key, b"payload").unwrap();
    let decoded = EncryptedBlob::from_base64(&blob.to_base64()).unwrap();
    assert_eq!(decoded, blob);
}
