//! Cryptographic primitives for HealthGuard.
//!
//! This module provides:
//! - HMAC-SHA256 identifier hashing (`hasher`)
//! - AES-256-GCM envelope encryption for credentials (`envelope`)
//! - Key wrappers and HKDF-based sub-key derivation (`keys`)

pub mod envelope;
pub mod hasher;
pub mod keys;

// Re-export the most commonly used items so callers can write:
//   use crate::crypto::{EnvelopeCipher, IdentifierHasher, ...};
pub use envelope::{EncryptedSecret, EnvelopeCipher};
pub use hasher::{HashedIdentifier, IdentifierHasher, IdentifierKind};
pub use keys::{generate_secure_token, HmacSecret, MasterKey};
