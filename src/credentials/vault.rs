//! High-level credential operations.
//!
//! `CredentialVault` ties the envelope cipher, the credential store, the
//! identity provider and the audit log together so the rest of the
//! application can work with calls like `vault.link(...)` without
//! touching ciphertext.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::info;
use zeroize::Zeroizing;

use super::{CredentialStatus, CredentialUpdate, StoredCredential};
use crate::audit::entry::{
    ACTION_CREDENTIAL_LINKED, ACTION_CREDENTIAL_REFRESHED, ACTION_CREDENTIAL_REVOKED,
};
use crate::audit::{AuditEvent, HashChainAuditLog};
use crate::crypto::{EnvelopeCipher, HashedIdentifier};
use crate::errors::{HealthGuardError, Result};
use crate::provider::{IdentityProvider, TokenGrant};
use crate::store::CredentialStore;

pub struct CredentialVault {
    store: Arc<dyn CredentialStore>,
    cipher: Arc<EnvelopeCipher>,
    provider: Arc<dyn IdentityProvider>,
    audit: Arc<HashChainAuditLog>,
}

impl CredentialVault {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        cipher: Arc<EnvelopeCipher>,
        provider: Arc<dyn IdentityProvider>,
        audit: Arc<HashChainAuditLog>,
    ) -> Self {
        Self {
            store,
            cipher,
            provider,
            audit,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Encrypt and store a freshly issued grant for `subject_id`,
    /// replacing any earlier credential from the same provider.
    pub fn link(
        &self,
        subject_id: &str,
        identifier: &HashedIdentifier,
        grant: &TokenGrant,
    ) -> Result<i64> {
        let refresh_token = grant.refresh_token.as_deref().ok_or_else(|| {
            HealthGuardError::Validation("grant carries no refresh token".into())
        })?;

        let now = Utc::now();
        let credential = StoredCredential {
            id: 0,
            subject_id: subject_id.to_string(),
            provider: self.provider.name().to_string(),
            identifier_hash: Some(identifier.hash.clone()),
            identifier_display: Some(identifier.masked()),
            access: self.cipher.encrypt(&grant.access_token)?,
            refresh: self.cipher.encrypt(refresh_token)?,
            expires_at: expiry_from(now, grant.expires_in)?,
            last_refreshed_at: now,
        };
        let id = self.store.upsert_credential(&credential)?;

        self.audit.append(
            AuditEvent::new(subject_id, ACTION_CREDENTIAL_LINKED)
                .target(identifier.hash.as_str())
                .meta("provider", self.provider.name())
                .meta("identifier_last4", identifier.display_fragment.as_str()),
        );
        info!(credential_id = id, provider = self.provider.name(), "credential linked");

        Ok(id)
    }

    /// Link state for display; never decrypts anything.
    pub fn status(&self, subject_id: &str) -> Result<CredentialStatus> {
        let Some(c) = self.load(subject_id)? else {
            return Ok(CredentialStatus::unlinked());
        };
        Ok(CredentialStatus {
            linked: true,
            identifier_display: c.identifier_display.clone(),
            expires_at: Some(c.expires_at),
            token_expired: c.is_expired(Utc::now()),
            last_refreshed_at: Some(c.last_refreshed_at),
        })
    }

    /// Decrypt the current access token for an outbound provider call.
    pub fn access_token(&self, subject_id: &str) -> Result<Zeroizing<String>> {
        let c = self.require(subject_id)?;
        self.cipher.decrypt(&c.access)
    }

    /// Refresh `subject_id`'s credential now, on the subject's behalf.
    pub fn refresh_now(&self, subject_id: &str) -> Result<DateTime<Utc>> {
        let c = self.require(subject_id)?;
        let expires_at = self.refresh_stored(&c, Utc::now())?;

        let mut event = AuditEvent::new(subject_id, ACTION_CREDENTIAL_REFRESHED)
            .meta("provider", self.provider.name());
        if let Some(hash) = &c.identifier_hash {
            event = event.target(hash.as_str());
        }
        self.audit.append(event);

        Ok(expires_at)
    }

    /// Remove the subject's credential. Returns `false` if none existed.
    pub fn revoke(&self, subject_id: &str) -> Result<bool> {
        let Some(c) = self.load(subject_id)? else {
            return Ok(false);
        };
        let removed = self.store.delete_credential(c.id)?;
        if removed {
            self.audit.append(
                AuditEvent::new(subject_id, ACTION_CREDENTIAL_REVOKED)
                    .meta("provider", self.provider.name()),
            );
        }
        Ok(removed)
    }

    /// Credentials of this vault's provider expiring before `now + lead`.
    pub fn due_for_rotation(
        &self,
        now: DateTime<Utc>,
        lead: Duration,
    ) -> Result<Vec<StoredCredential>> {
        let threshold = now.checked_add_signed(lead).ok_or_else(|| {
            HealthGuardError::ConfigError("rotation lead window out of range".into())
        })?;
        self.store
            .credentials_due_for_rotation(self.provider.name(), threshold)
    }

    /// Decrypt the stored refresh token, call the provider, re-encrypt
    /// and persist the result. Returns the new expiry.
    ///
    /// Nothing is written unless the provider call succeeds. Auditing is
    /// left to the caller, which knows who initiated the refresh.
    pub fn refresh_stored(
        &self,
        credential: &StoredCredential,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        let refresh_token = self.cipher.decrypt(&credential.refresh)?;
        let grant = self.provider.refresh(&refresh_token)?;
        let expires_at = expiry_from(now, grant.expires_in)?;

        let update = CredentialUpdate {
            access: self.cipher.encrypt(&grant.access_token)?,
            refresh: match grant.refresh_token.as_deref() {
                Some(rt) => Some(self.cipher.encrypt(rt)?),
                None => None,
            },
            expires_at,
            last_refreshed_at: now,
        };
        self.store.update_credential(credential.id, &update)?;

        Ok(update.expires_at)
    }

    fn load(&self, subject_id: &str) -> Result<Option<StoredCredential>> {
        self.store.credential_for(subject_id, self.provider.name())
    }

    fn require(&self, subject_id: &str) -> Result<StoredCredential> {
        self.load(subject_id)?.ok_or_else(|| {
            HealthGuardError::CredentialNotFound(format!(
                "subject '{subject_id}' with provider '{}'",
                self.provider.name()
            ))
        })
    }
}

/// Longest token lifetime accepted from a provider.
const MAX_TOKEN_LIFETIME_SECS: u64 = 10 * 365 * 24 * 3600;

/// Expiry for a provider-issued lifetime. A lifetime past the cap is a
/// provider error.
fn expiry_from(now: DateTime<Utc>, expires_in: u64) -> Result<DateTime<Utc>> {
    let out_of_range =
        || HealthGuardError::ExternalProvider(format!("expires_in out of range: {expires_in}"));
    if expires_in > MAX_TOKEN_LIFETIME_SECS {
        return Err(out_of_range());
    }
    i64::try_from(expires_in)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or_else(out_of_range)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::crypto::{HmacSecret, IdentifierHasher, IdentifierKind, MasterKey};
    use crate::store::{AuditStore, SqliteStore};

    /// Provider that hands out numbered tokens, or fails when told to.
    struct StubProvider {
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    impl IdentityProvider for StubProvider {
        fn name(&self) -> &str {
            "abha"
        }

        fn refresh(&self, refresh_token: &str) -> Result<TokenGrant> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(refresh_token.to_string());
            if self.fail {
                return Err(HealthGuardError::ExternalProvider("timed out".into()));
            }
            Ok(TokenGrant {
                access_token: format!("access-{}", calls.len()),
                refresh_token: None,
                expires_in: 3600,
            })
        }
    }

    struct Fixture {
        vault: CredentialVault,
        store: Arc<SqliteStore>,
        provider: Arc<StubProvider>,
        identifier: HashedIdentifier,
    }

    fn fixture(fail: bool) -> Fixture {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let cipher = Arc::new(EnvelopeCipher::new(&MasterKey::new([7; 32])).unwrap());
        let provider = Arc::new(StubProvider {
            calls: Mutex::new(Vec::new()),
            fail,
        });
        let audit = Arc::new(HashChainAuditLog::new(store.clone()));
        let vault = CredentialVault::new(store.clone(), cipher, provider.clone(), audit);

        let hasher = IdentifierHasher::new(HmacSecret::new(&"k".repeat(64)).unwrap()).unwrap();
        let identifier = hasher
            .hash(IdentifierKind::HealthId, "91-1234-5678-4321")
            .unwrap();

        Fixture {
            vault,
            store,
            provider,
            identifier,
        }
    }

    fn grant() -> TokenGrant {
        TokenGrant {
            access_token: "initial-access".into(),
            refresh_token: Some("initial-refresh".into()),
            expires_in: 3600,
        }
    }

    #[test]
    fn link_stores_only_ciphertext() {
        let f = fixture(false);
        f.vault.link("user-1", &f.identifier, &grant()).unwrap();

        let stored = f.store.credential_for("user-1", "abha").unwrap().unwrap();
        assert!(!stored.access.ciphertext.contains("initial"));
        assert_eq!(stored.identifier_display.as_deref(), Some("**-****-****-4321"));
        assert_eq!(&*f.vault.access_token("user-1").unwrap(), "initial-access");
    }

    #[test]
    fn link_requires_refresh_token() {
        let f = fixture(false);
        let mut g = grant();
        g.refresh_token = None;
        assert!(matches!(
            f.vault.link("user-1", &f.identifier, &g),
            Err(HealthGuardError::Validation(_))
        ));
    }

    #[test]
    fn link_is_audited() {
        let f = fixture(false);
        f.vault.link("user-1", &f.identifier, &grant()).unwrap();
        let tail = f.store.latest_entry().unwrap().unwrap();
        assert_eq!(tail.action, ACTION_CREDENTIAL_LINKED);
        assert_eq!(tail.actor, "user-1");
        assert_eq!(tail.target_id.as_deref(), Some(f.identifier.hash.as_str()));
    }

    #[test]
    fn refresh_now_uses_decrypted_refresh_token() {
        let f = fixture(false);
        f.vault.link("user-1", &f.identifier, &grant()).unwrap();
        f.vault.refresh_now("user-1").unwrap();

        assert_eq!(*f.provider.calls.lock().unwrap(), vec!["initial-refresh"]);
        assert_eq!(&*f.vault.access_token("user-1").unwrap(), "access-1");
        let tail = f.store.latest_entry().unwrap().unwrap();
        assert_eq!(tail.action, ACTION_CREDENTIAL_REFRESHED);
    }

    #[test]
    fn failed_refresh_leaves_credential_untouched() {
        let f = fixture(true);
        f.vault.link("user-1", &f.identifier, &grant()).unwrap();
        let before = f.store.credential_for("user-1", "abha").unwrap().unwrap();

        assert!(matches!(
            f.vault.refresh_now("user-1"),
            Err(HealthGuardError::ExternalProvider(_))
        ));
        let after = f.store.credential_for("user-1", "abha").unwrap().unwrap();
        assert_eq!(before, after);
        assert_eq!(f.store.count().unwrap(), 1);
    }

    #[test]
    fn oversized_lifetime_is_rejected_without_writing() {
        let f = fixture(false);
        let mut g = grant();
        g.expires_in = 10_000_000_000_000;
        assert!(matches!(
            f.vault.link("user-1", &f.identifier, &g),
            Err(HealthGuardError::ExternalProvider(_))
        ));
        assert!(f.store.credential_for("user-1", "abha").unwrap().is_none());
    }

    #[test]
    fn expiry_accepts_lifetimes_up_to_the_cap() {
        let now = Utc::now();
        assert_eq!(
            expiry_from(now, 3600).unwrap(),
            now + Duration::seconds(3600)
        );
        assert!(expiry_from(now, MAX_TOKEN_LIFETIME_SECS).is_ok());
        assert!(expiry_from(now, MAX_TOKEN_LIFETIME_SECS + 1).is_err());
        assert!(expiry_from(now, u64::MAX).is_err());
    }

    #[test]
    fn oversized_lead_window_is_a_config_error() {
        let f = fixture(false);
        assert!(matches!(
            f.vault.due_for_rotation(Utc::now(), Duration::MAX),
            Err(HealthGuardError::ConfigError(_))
        ));
    }

    #[test]
    fn status_reports_link_state() {
        let f = fixture(false);
        assert!(!f.vault.status("user-1").unwrap().linked);

        f.vault.link("user-1", &f.identifier, &grant()).unwrap();
        let status = f.vault.status("user-1").unwrap();
        assert!(status.linked);
        assert!(!status.token_expired);
        assert_eq!(status.identifier_display.as_deref(), Some("**-****-****-4321"));
    }

    #[test]
    fn revoke_removes_and_audits() {
        let f = fixture(false);
        f.vault.link("user-1", &f.identifier, &grant()).unwrap();
        assert!(f.vault.revoke("user-1").unwrap());
        assert!(!f.vault.revoke("user-1").unwrap());
        assert!(matches!(
            f.vault.access_token("user-1"),
            Err(HealthGuardError::CredentialNotFound(_))
        ));
        assert_eq!(
            f.store.latest_entry().unwrap().unwrap().action,
            ACTION_CREDENTIAL_REVOKED
        );
    }
}
