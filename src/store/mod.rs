//! Storage collaborator contracts and the bundled SQLite implementation.
//!
//! The security core only ever talks to these traits. Audit entries have
//! no update or delete operation here; credentials are updated in place
//! by row id.

pub mod sqlite;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::audit::{AuditEntry, AuditRecord};
use crate::credentials::{CredentialUpdate, StoredCredential};
use crate::errors::Result;

pub use sqlite::SqliteStore;

/// Aggregate statistics over the audit log.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuditStats {
    pub total_entries: u64,
    /// `(action, count)`, most frequent first.
    pub by_action: Vec<(String, u64)>,
    pub first_entry_at: Option<DateTime<Utc>>,
    pub last_entry_at: Option<DateTime<Utc>>,
}

/// Append-only persistence for audit entries.
pub trait AuditStore: Send + Sync {
    /// Persist a chained record and return its allocated id.
    fn append_entry(&self, record: &AuditRecord) -> Result<i64>;

    /// The most recently appended entry, if any.
    fn latest_entry(&self) -> Result<Option<AuditEntry>>;

    /// Every entry in insertion order, read as one snapshot.
    fn entries_in_order(&self) -> Result<Vec<AuditEntry>>;

    fn entry_by_id(&self, id: i64) -> Result<Option<AuditEntry>>;

    /// A window of entries, newest first.
    fn page(&self, offset: usize, limit: usize) -> Result<Vec<AuditEntry>>;

    fn count(&self) -> Result<u64>;

    fn stats(&self) -> Result<AuditStats>;
}

/// Persistence for encrypted third-party credentials.
pub trait CredentialStore: Send + Sync {
    /// Insert or replace the credential for `(subject_id, provider)`.
    fn upsert_credential(&self, credential: &StoredCredential) -> Result<i64>;

    fn credential_for(&self, subject_id: &str, provider: &str) -> Result<Option<StoredCredential>>;

    /// Credentials of `provider` expiring before `threshold`.
    fn credentials_due_for_rotation(
        &self,
        provider: &str,
        threshold: DateTime<Utc>,
    ) -> Result<Vec<StoredCredential>>;

    /// Conditional update by row id; a missing row is an error.
    fn update_credential(&self, id: i64, update: &CredentialUpdate) -> Result<()>;

    fn delete_credential(&self, id: i64) -> Result<bool>;
}

/// Maintenance routines triggered by the scheduler. The deletion logic
/// lives entirely in the store.
pub trait MaintenanceStore: Send + Sync {
    /// Remove sessions whose expiry has passed. Returns rows removed.
    fn cleanup_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize>;

    /// Apply the retention policy. Never touches audit entries.
    fn enforce_retention(&self, retention_days: u32, now: DateTime<Utc>) -> Result<usize>;
}
