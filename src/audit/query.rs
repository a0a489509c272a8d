//! Read-only auditor surface: paginated listing, single fetch,
//! verification trigger and aggregate statistics.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::chain::HashChainAuditLog;
use super::entry::AuditEntry;
use crate::errors::{HealthGuardError, Result};
use crate::store::AuditStats;

/// Largest page an auditor may request.
pub const MAX_PAGE_SIZE: usize = 1000;

/// Page size used when none is given.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// One page of audit entries, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct AuditPage {
    pub entries: Vec<AuditEntry>,
    pub page: usize,
    pub limit: usize,
    pub total: u64,
    pub total_pages: u64,
}

/// Verification result as presented to auditors.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub valid: bool,
    pub broken_links: Vec<i64>,
    pub checked: usize,
    pub message: String,
    pub checked_at: DateTime<Utc>,
}

pub struct AuditReader {
    log: Arc<HashChainAuditLog>,
}

impl AuditReader {
    pub fn new(log: Arc<HashChainAuditLog>) -> Self {
        Self { log }
    }

    /// List entries newest first. `page` is 1-based; `limit` is clamped
    /// to `1..=MAX_PAGE_SIZE`.
    pub fn list(&self, page: usize, limit: usize) -> Result<AuditPage> {
        let page = page.max(1);
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let offset = (page - 1).saturating_mul(limit);

        let store = self.log.store();
        let total = store.count()?;
        let entries = store.page(offset, limit)?;
        let total_pages = total.div_ceil(limit as u64);

        Ok(AuditPage {
            entries,
            page,
            limit,
            total,
            total_pages,
        })
    }

    pub fn get(&self, id: i64) -> Result<AuditEntry> {
        self.log
            .store()
            .entry_by_id(id)?
            .ok_or(HealthGuardError::AuditEntryNotFound(id))
    }

    pub fn verify(&self) -> Result<VerificationReport> {
        let result = self.log.verify_chain()?;
        let message = if result.valid {
            "Audit chain integrity verified".to_string()
        } else {
            format!(
                "Chain integrity compromised. {} broken links detected.",
                result.broken_links.len()
            )
        };

        Ok(VerificationReport {
            valid: result.valid,
            broken_links: result.broken_links,
            checked: result.checked,
            message,
            checked_at: Utc::now(),
        })
    }

    pub fn stats(&self) -> Result<AuditStats> {
        self.log.store().stats()
    }
}
