//! Third-party credentials (access/refresh tokens) held at rest.
//!
//! A subject has at most one credential per provider. Both tokens are
//! stored as `EncryptedSecret`s; only the lifecycle timestamps and the
//! hashed identifier are kept in the clear.

pub mod vault;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::crypto::EncryptedSecret;

pub use vault::CredentialVault;

/// A credential row as persisted by the storage collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredCredential {
    /// Allocated by the store; ignored on upsert.
    pub id: i64,
    pub subject_id: String,
    pub provider: String,
    pub identifier_hash: Option<String>,
    pub identifier_display: Option<String>,
    pub access: EncryptedSecret,
    pub refresh: EncryptedSecret,
    pub expires_at: DateTime<Utc>,
    pub last_refreshed_at: DateTime<Utc>,
}

/// Fields written when a credential is refreshed in place.
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialUpdate {
    pub access: EncryptedSecret,
    /// Present only when the provider issued a new refresh token.
    pub refresh: Option<EncryptedSecret>,
    pub expires_at: DateTime<Utc>,
    pub last_refreshed_at: DateTime<Utc>,
}

/// Rotation state derived from a credential's expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialState {
    /// Far enough from expiry to leave alone.
    Active,
    /// Inside the lead window (or already expired); next tick refreshes it.
    DueForRotation,
}

impl StoredCredential {
    pub fn state(&self, now: DateTime<Utc>, lead: Duration) -> CredentialState {
        if self.expires_at < now + lead {
            CredentialState::DueForRotation
        } else {
            CredentialState::Active
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// What a subject (or support staff) may see about a linked credential.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CredentialStatus {
    pub linked: bool,
    pub identifier_display: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub token_expired: bool,
    pub last_refreshed_at: Option<DateTime<Utc>>,
}

impl CredentialStatus {
    pub fn unlinked() -> Self {
        Self {
            linked: false,
            identifier_display: None,
            expires_at: None,
            token_expired: false,
            last_refreshed_at: None,
        }
    }
}
