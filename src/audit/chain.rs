//! The hash-chained, append-only audit log.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, warn};

use super::alert::{AlertSink, OperationalAlert, TracingAlertSink};
use super::entry::{AuditEntry, AuditEvent, AuditRecord, GENESIS_HASH};
use crate::errors::Result;
use crate::store::AuditStore;

/// Result of a best-effort append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The entry was persisted under this id.
    Recorded(i64),
    /// The write failed; an operational alert was raised.
    Dropped,
}

impl AppendOutcome {
    pub fn is_recorded(&self) -> bool {
        matches!(self, Self::Recorded(_))
    }
}

/// Outcome of a full-chain verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainVerification {
    pub valid: bool,
    /// Ids of entries whose link or own digest failed, in chain order.
    pub broken_links: Vec<i64>,
    /// Number of entries examined.
    pub checked: usize,
}

/// Append-only log where every entry embeds the digest of its predecessor.
pub struct HashChainAuditLog {
    store: Arc<dyn AuditStore>,
    alerts: Arc<dyn AlertSink>,
    // Serializes "read tail, then insert" so concurrent appends in this
    // process cannot fork the chain.
    append_lock: Mutex<()>,
}

impl HashChainAuditLog {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self::with_alert_sink(store, Arc::new(TracingAlertSink))
    }

    pub fn with_alert_sink(store: Arc<dyn AuditStore>, alerts: Arc<dyn AlertSink>) -> Self {
        Self {
            store,
            alerts,
            append_lock: Mutex::new(()),
        }
    }

    /// The underlying store (read access for auditor queries).
    pub fn store(&self) -> &Arc<dyn AuditStore> {
        &self.store
    }

    /// Record `event`, never failing the caller.
    ///
    /// A storage failure is reported to the alert sink and returned as
    /// `AppendOutcome::Dropped`; the primary action proceeds either way.
    pub fn append(&self, event: AuditEvent) -> AppendOutcome {
        let action = event.action.clone();
        match self.try_append(event) {
            Ok(entry) => AppendOutcome::Recorded(entry.id),
            Err(e) => {
                self.alerts.raise(&OperationalAlert::audit_write_failed(&action, &e));
                AppendOutcome::Dropped
            }
        }
    }

    /// Record `event`, surfacing storage failures to the caller.
    pub fn try_append(&self, event: AuditEvent) -> Result<AuditEntry> {
        let _guard = self
            .append_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let previous_hash = match self.store.latest_entry()? {
            Some(tail) => tail.self_hash,
            None => GENESIS_HASH.to_string(),
        };

        let record = AuditRecord::chain(event, &previous_hash, Utc::now())?;
        let id = self.store.append_entry(&record)?;
        debug!(id, action = %record.action, "audit entry appended");

        Ok(AuditEntry {
            id,
            actor: record.actor,
            action: record.action,
            target_id: record.target_id,
            metadata: record.metadata,
            previous_hash: record.previous_hash,
            self_hash: record.self_hash,
            created_at: record.created_at,
        })
    }

    /// Walk the whole chain in insertion order and report broken entries.
    ///
    /// An entry is broken if its stored digest does not match its fields,
    /// or if its previous-hash does not match the entry before it. Reads
    /// a single snapshot, so appends racing with the scan are simply not
    /// seen. Read-only: nothing is repaired.
    pub fn verify_chain(&self) -> Result<ChainVerification> {
        let entries = self.store.entries_in_order()?;
        let mut broken_links = Vec::new();

        for (i, entry) in entries.iter().enumerate() {
            let link_ok = match i.checked_sub(1).map(|p| &entries[p]) {
                Some(prev) => entry.previous_hash == prev.self_hash,
                None => true,
            };
            let digest_ok = entry.recompute_hash()? == entry.self_hash;

            if !(link_ok && digest_ok) {
                broken_links.push(entry.id);
            }
        }

        if !broken_links.is_empty() {
            warn!(
                broken = broken_links.len(),
                checked = entries.len(),
                "audit chain integrity check failed"
            );
        }

        Ok(ChainVerification {
            valid: broken_links.is_empty(),
            broken_links,
            checked: entries.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::alert::RecordingAlertSink;
    use crate::errors::HealthGuardError;
    use crate::store::{AuditStats, SqliteStore};

    fn log() -> (HashChainAuditLog, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        (HashChainAuditLog::new(store.clone()), store)
    }

    #[test]
    fn first_entry_links_to_genesis() {
        let (log, _store) = log();
        let entry = log.try_append(AuditEvent::new("u", "a")).unwrap();
        assert_eq!(entry.previous_hash, GENESIS_HASH);
    }

    #[test]
    fn entries_link_to_predecessor() {
        let (log, store) = log();
        for i in 0..3 {
            log.append(AuditEvent::new("u", format!("action_{i}")));
        }
        let entries = store.entries_in_order().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].previous_hash, entries[0].self_hash);
        assert_eq!(entries[2].previous_hash, entries[1].self_hash);
    }

    #[test]
    fn empty_log_is_vacuously_valid() {
        let (log, _store) = log();
        let report = log.verify_chain().unwrap();
        assert!(report.valid);
        assert!(report.broken_links.is_empty());
        assert_eq!(report.checked, 0);
    }

    #[test]
    fn sequential_appends_verify() {
        let (log, _store) = log();
        for i in 0..10 {
            let outcome = log.append(AuditEvent::new("u", "a").meta("n", i));
            assert!(outcome.is_recorded());
        }
        let report = log.verify_chain().unwrap();
        assert!(report.valid);
        assert_eq!(report.checked, 10);
    }

    struct FailingStore;

    impl AuditStore for FailingStore {
        fn append_entry(&self, _record: &AuditRecord) -> Result<i64> {
            Err(HealthGuardError::Storage("disk full".into()))
        }
        fn latest_entry(&self) -> Result<Option<AuditEntry>> {
            Ok(None)
        }
        fn entries_in_order(&self) -> Result<Vec<AuditEntry>> {
            Ok(Vec::new())
        }
        fn entry_by_id(&self, _id: i64) -> Result<Option<AuditEntry>> {
            Ok(None)
        }
        fn page(&self, _offset: usize, _limit: usize) -> Result<Vec<AuditEntry>> {
            Ok(Vec::new())
        }
        fn count(&self) -> Result<u64> {
            Ok(0)
        }
        fn stats(&self) -> Result<AuditStats> {
            Ok(AuditStats::default())
        }
    }

    #[test]
    fn storage_failure_is_swallowed_and_alerted() {
        let sink = Arc::new(RecordingAlertSink::default());
        let log = HashChainAuditLog::with_alert_sink(Arc::new(FailingStore), sink.clone());

        let outcome = log.append(AuditEvent::new("u", "credential_linked"));
        assert_eq!(outcome, AppendOutcome::Dropped);

        let alerts = sink.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, "audit_write_failed");
        assert!(alerts[0].message.contains("credential_linked"));
    }

    #[test]
    fn try_append_surfaces_storage_failure() {
        let log = HashChainAuditLog::new(Arc::new(FailingStore));
        assert!(log.try_append(AuditEvent::new("u", "a")).is_err());
    }
}
