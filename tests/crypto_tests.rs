//! Integration tests for identifier hashing and envelope encryption.

use healthguard::crypto::keys::{generate_secure_token, MIN_HMAC_SECRET_LEN};
use healthguard::crypto::{
    EnvelopeCipher, HmacSecret, IdentifierHasher, IdentifierKind, MasterKey,
};
use healthguard::errors::HealthGuardError;

fn hasher(secret: &str) -> IdentifierHasher {
    IdentifierHasher::new(HmacSecret::new(secret).unwrap()).unwrap()
}

fn cipher() -> EnvelopeCipher {
    EnvelopeCipher::new(&MasterKey::from_material(&"m".repeat(32)).unwrap()).unwrap()
}

// ---------------------------------------------------------------------------
// Identifier hashing
// ---------------------------------------------------------------------------

#[test]
fn national_id_hash_is_stable_and_keyed() {
    let s = "S".repeat(MIN_HMAC_SECRET_LEN);
    let a = hasher(&s).hash(IdentifierKind::NationalId, "123456789012").unwrap();
    let b = hasher(&s).hash(IdentifierKind::NationalId, "1234 5678 9012").unwrap();
    assert_eq!(a.hash, b.hash);
    assert_eq!(a.hash.len(), 64);
    assert_eq!(a.display_fragment, "9012");

    let other = hasher(&"T".repeat(MIN_HMAC_SECRET_LEN))
        .hash(IdentifierKind::NationalId, "123456789012")
        .unwrap();
    assert_ne!(a.hash, other.hash);
}

#[test]
fn wrong_length_identifier_is_rejected_without_echo() {
    let h = hasher(&"S".repeat(MIN_HMAC_SECRET_LEN));
    let err = h.hash(IdentifierKind::NationalId, "12345").unwrap_err();
    assert!(matches!(err, HealthGuardError::Validation(_)));
    assert!(!err.to_string().contains("12345"));
}

#[test]
fn document_numbers_are_case_insensitive() {
    let h = hasher(&"S".repeat(MIN_HMAC_SECRET_LEN));
    let upper = h.hash(IdentifierKind::DocumentNumber, "AB12-3456").unwrap();
    let lower = h.hash(IdentifierKind::DocumentNumber, "ab123456").unwrap();
    assert_eq!(upper.hash, lower.hash);
    assert!(upper.matches(&lower.hash));
}

// ---------------------------------------------------------------------------
// Envelope encryption
// ---------------------------------------------------------------------------

#[test]
fn encrypt_decrypt_roundtrip_with_fresh_iv() {
    let c = cipher();
    let a = c.encrypt("refresh-token-value").unwrap();
    let b = c.encrypt("refresh-token-value").unwrap();

    assert_ne!(a.iv, b.iv);
    assert_ne!(a.ciphertext, b.ciphertext);
    assert_eq!(*c.decrypt(&a).unwrap(), "refresh-token-value");
    assert_eq!(*c.decrypt(&b).unwrap(), "refresh-token-value");
}

#[test]
fn tampered_ciphertext_fails_authentication() {
    let c = cipher();
    let mut secret = c.encrypt("access-token").unwrap();
    let first = secret.ciphertext.remove(0);
    secret
        .ciphertext
        .insert(0, if first == '0' { '1' } else { '0' });

    assert!(matches!(c.decrypt(&secret), Err(HealthGuardError::DecryptionFailed)));
}

#[test]
fn different_master_key_cannot_decrypt() {
    let secret = cipher().encrypt("access-token").unwrap();
    let other = EnvelopeCipher::new(&MasterKey::from_material(&"n".repeat(32)).unwrap()).unwrap();
    assert!(matches!(other.decrypt(&secret), Err(HealthGuardError::DecryptionFailed)));
}

#[test]
fn empty_plaintext_is_validation_error() {
    assert!(matches!(cipher().encrypt(""), Err(HealthGuardError::Validation(_))));
}

#[test]
fn secure_tokens_are_hex_and_unique() {
    let a = generate_secure_token(32);
    let b = generate_secure_token(32);
    assert_eq!(a.len(), 64);
    assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    assert_ne!(a, b);
}
