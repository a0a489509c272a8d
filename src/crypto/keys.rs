//! Key material wrappers and HKDF-SHA256 sub-key derivation.
//!
//! Two secrets are supplied from the environment:
//! - the **HMAC secret** used for identifier hashing (at least 64 chars)
//! - the **encryption key** protecting stored credentials (at least 32 chars)
//!
//! Neither is used raw as a cipher key. HKDF (RFC 5869) expands each
//! into independent 256-bit sub-keys bound to a context label, so the
//! identifier digests and the rate-limit client keys never share a key.

use std::fmt;

use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

use crate::errors::{HealthGuardError, Result};

/// Length of derived sub-keys (256 bits).
pub const KEY_LEN: usize = 32;

/// Minimum accepted length of the HMAC secret, in characters.
pub const MIN_HMAC_SECRET_LEN: usize = 64;

/// Minimum accepted length of the encryption key, in characters.
pub const MIN_ENCRYPTION_KEY_LEN: usize = 32;

const ENVELOPE_INFO: &[u8] = b"healthguard-envelope-key";
const CLIENT_ADDRESS_INFO: &[u8] = b"healthguard-client-address";

/// Server-held secret keying every identifier digest.
///
/// The bytes are zeroed on drop and never printed.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct HmacSecret {
    bytes: Vec<u8>,
}

impl HmacSecret {
    /// Wrap `secret`, rejecting anything shorter than 64 characters.
    pub fn new(secret: &str) -> Result<Self> {
        if secret.chars().count() < MIN_HMAC_SECRET_LEN {
            return Err(HealthGuardError::ConfigError(format!(
                "HMAC secret must be at least {MIN_HMAC_SECRET_LEN} characters"
            )));
        }
        Ok(Self {
            bytes: secret.as_bytes().to_vec(),
        })
    }

    /// Access the raw secret bytes (e.g. to key an HMAC).
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Derive the key used to hash client network addresses.
    pub fn derive_client_key(&self) -> Result<Zeroizing<[u8; KEY_LEN]>> {
        hkdf_derive(&self.bytes, CLIENT_ADDRESS_INFO)
    }
}

impl fmt::Debug for HmacSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HmacSecret(<redacted>)")
    }
}

/// The 256-bit AEAD key protecting credentials at rest.
///
/// Built from the configured encryption key via HKDF; the configured
/// string itself is not retained.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct MasterKey {
    bytes: [u8; KEY_LEN],
}

impl MasterKey {
    /// Create a `MasterKey` from already-derived raw bytes.
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Derive the AEAD key from the configured encryption key material.
    pub fn from_material(material: &str) -> Result<Self> {
        if material.chars().count() < MIN_ENCRYPTION_KEY_LEN {
            return Err(HealthGuardError::ConfigError(format!(
                "encryption key must be at least {MIN_ENCRYPTION_KEY_LEN} characters"
            )));
        }
        let derived = hkdf_derive(material.as_bytes(), ENVELOPE_INFO)?;
        Ok(Self::new(*derived))
    }

    /// Access the raw key bytes (e.g. to build a cipher).
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(<redacted>)")
    }
}

/// Run HKDF-SHA256 extract+expand over `ikm` with the given `info`.
fn hkdf_derive(ikm: &[u8], info: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let hk = Hkdf::<Sha256>::new(None, ikm);

    let mut okm = Zeroizing::new([0u8; KEY_LEN]);
    hk.expand(info, &mut okm[..])
        .map_err(|e| HealthGuardError::KeyDerivationFailed(format!("HKDF expand failed: {e}")))?;

    Ok(okm)
}

/// Generate `len` random bytes and return them hex-encoded.
///
/// Used for OAuth-style `state` parameters and similar one-off tokens.
pub fn generate_secure_token(len: usize) -> String {
    let mut buf = vec![0u8; len];
    rand::rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    #[test]
    fn hmac_secret_rejects_short_input() {
        let err = HmacSecret::new("too-short").unwrap_err();
        assert!(matches!(err, HealthGuardError::ConfigError(_)));
    }

    #[test]
    fn master_key_rejects_short_material() {
        assert!(MasterKey::from_material("short").is_err());
    }

    #[test]
    fn master_key_derivation_is_deterministic() {
        let a = MasterKey::from_material(&SECRET[..32]).unwrap();
        let b = MasterKey::from_material(&SECRET[..32]).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
        // Derived, not copied from the input.
        assert_ne!(&a.as_bytes()[..], &SECRET.as_bytes()[..32]);
    }

    #[test]
    fn client_key_differs_from_secret() {
        let secret = HmacSecret::new(SECRET).unwrap();
        let client = secret.derive_client_key().unwrap();
        assert_ne!(&client[..], &secret.as_bytes()[..KEY_LEN]);
    }

    #[test]
    fn debug_output_is_redacted() {
        let secret = HmacSecret::new(SECRET).unwrap();
        let key = MasterKey::from_material(SECRET).unwrap();
        assert!(!format!("{secret:?}").contains("0123"));
        assert_eq!(format!("{key:?}"), "MasterKey(<redacted>)");
    }

    #[test]
    fn secure_tokens_are_hex_and_unique() {
        let a = generate_secure_token(16);
        let b = generate_secure_token(16);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
