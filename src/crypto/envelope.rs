//! AES-256-GCM envelope encryption for credentials at rest.
//!
//! Each call to `encrypt` generates a fresh random 12-byte nonce. The
//! result is kept as three separate hex strings so they map directly
//! onto storage columns:
//!
//! ```text
//! ciphertext (hex) | iv: 12-byte nonce (hex) | tag: 16-byte GCM tag (hex)
//! ```
//!
//! `decrypt` verifies the tag before any plaintext is released; any
//! mismatch or malformed component is a hard `DecryptionFailed`.

use aes_gcm::aead::{AeadInPlace, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce, Tag};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::keys::MasterKey;
use crate::errors::{HealthGuardError, Result};

/// Size of the AES-256-GCM nonce in bytes.
const NONCE_LEN: usize = 12;

/// Size of the GCM authentication tag in bytes.
const TAG_LEN: usize = 16;

/// The three components needed to decrypt and verify a stored secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSecret {
    pub ciphertext: String,
    pub iv: String,
    pub tag: String,
}

/// Authenticated symmetric cipher keyed by the externally supplied master key.
pub struct EnvelopeCipher {
    cipher: Aes256Gcm,
}

impl EnvelopeCipher {
    pub fn new(key: &MasterKey) -> Result<Self> {
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| HealthGuardError::EncryptionFailed(format!("invalid key length: {e}")))?;
        Ok(Self { cipher })
    }

    /// Encrypt `plaintext` under a fresh random nonce.
    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedSecret> {
        if plaintext.is_empty() {
            return Err(HealthGuardError::Validation(
                "refusing to encrypt an empty secret".into(),
            ));
        }

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let mut buffer = Zeroizing::new(plaintext.as_bytes().to_vec());
        let tag = self
            .cipher
            .encrypt_in_place_detached(&nonce, b"", &mut buffer)
            .map_err(|e| HealthGuardError::EncryptionFailed(format!("encryption error: {e}")))?;

        Ok(EncryptedSecret {
            ciphertext: hex::encode(&*buffer),
            iv: hex::encode(nonce),
            tag: hex::encode(tag),
        })
    }

    /// Decrypt a secret produced by `encrypt`, verifying its tag first.
    /// The plaintext is wiped when the returned value drops.
    pub fn decrypt(&self, secret: &EncryptedSecret) -> Result<Zeroizing<String>> {
        self.decrypt_parts(&secret.ciphertext, &secret.iv, &secret.tag)
    }

    /// Decrypt from the individual hex components.
    pub fn decrypt_parts(
        &self,
        ciphertext: &str,
        iv: &str,
        tag: &str,
    ) -> Result<Zeroizing<String>> {
        let nonce_bytes = hex::decode(iv).map_err(|_| HealthGuardError::DecryptionFailed)?;
        let tag_bytes = hex::decode(tag).map_err(|_| HealthGuardError::DecryptionFailed)?;
        if nonce_bytes.len() != NONCE_LEN || tag_bytes.len() != TAG_LEN {
            return Err(HealthGuardError::DecryptionFailed);
        }

        let mut buffer = Zeroizing::new(
            hex::decode(ciphertext).map_err(|_| HealthGuardError::DecryptionFailed)?,
        );

        self.cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(&nonce_bytes),
                b"",
                &mut buffer,
                Tag::from_slice(&tag_bytes),
            )
            .map_err(|_| HealthGuardError::DecryptionFailed)?;

        let plaintext =
            std::str::from_utf8(&buffer).map_err(|_| HealthGuardError::DecryptionFailed)?;
        Ok(Zeroizing::new(plaintext.to_owned()))
    }
}
