//! Property tests for the codec: round-trips always succeed with the
//! right key, and any single-bit modification fails closed.

use keyward_crypto::{decrypt, encrypt, generate_random_key, LicenseKeypair};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn encrypt_decrypt_roundtrip(plaintext in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let key = generate_random_key();
        let blob = encrypt(&key, &plaintext).unwrap();
        prop_assert_eq!(decrypt(&key, &blob).unwrap(), plaintext);
    }

    #[test]
    fn ciphertext_tamper_fails(
        plaintext in proptest::collection::vec(any::<u8>(), 1..512),
        byte_sel in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let key = generate_random_key();
        let mut blob = encrypt(&key, &plaintext).unwrap();
        let idx = byte_sel.index(blob.ciphertext.len());
        blob.ciphertext[idx] ^= 1 << bit;
        prop_assert!(decrypt(&key, &blob).is_err());
    }

    #[test]
    fn signed_payload_tamper_fails(
        payload in proptest::collection::vec(any::<u8>(), 1..512),
        byte_sel in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let keypair = LicenseKeypair::generate();
        let sig = keypair.signing_key.sign(&payload);

        let mut tampered = payload.clone();
        let idx = byte_sel.index(tampered.len());
        tampered[idx] ^= 1 << bit;

        prop_assert!(keypair.verifying_key.verify(&payload, &sig).is_ok());
        prop_assert!(keypair.verifying_key.verify(&tampered, &sig).is_err());
    }
}
