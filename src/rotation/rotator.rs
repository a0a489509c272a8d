//! One pass of proactive credential rotation.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::audit::entry::{ACTION_CREDENTIAL_AUTO_ROTATED, SYSTEM_ACTOR};
use crate::audit::{AlertSink, AuditEvent, HashChainAuditLog, OperationalAlert, TracingAlertSink};
use crate::credentials::{CredentialVault, StoredCredential};
use crate::errors::{HealthGuardError, Result};

/// What happened to one credential during a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationOutcome {
    /// Refreshed and persisted; back to `Active` with a new expiry.
    Rotated { expires_at: DateTime<Utc> },
    /// Provider unavailable or its grant unusable; still `DueForRotation`,
    /// retried next tick.
    Deferred,
    /// Could not be rotated for a local reason (corrupt secret, storage).
    Failed,
}

/// Per-tick summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RotationReport {
    pub due: usize,
    pub rotated: usize,
    pub deferred: usize,
    pub failed: usize,
}

pub struct TokenRotator {
    vault: Arc<CredentialVault>,
    audit: Arc<HashChainAuditLog>,
    alerts: Arc<dyn AlertSink>,
    lead: Duration,
}

impl TokenRotator {
    pub fn new(vault: Arc<CredentialVault>, audit: Arc<HashChainAuditLog>, lead: Duration) -> Self {
        Self {
            vault,
            audit,
            alerts: Arc::new(TracingAlertSink),
            lead,
        }
    }

    pub fn with_alert_sink(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = alerts;
        self
    }

    pub fn lead(&self) -> Duration {
        self.lead
    }

    /// Rotate everything currently inside the lead window.
    pub fn run_once(&self) -> Result<RotationReport> {
        self.run_at(Utc::now())
    }

    /// As `run_once`, with an explicit clock.
    ///
    /// Each credential gets exactly one attempt; a failure is recorded in
    /// the report and the loop moves on to the next one.
    pub fn run_at(&self, now: DateTime<Utc>) -> Result<RotationReport> {
        let due = self.vault.due_for_rotation(now, self.lead)?;
        let mut report = RotationReport {
            due: due.len(),
            ..RotationReport::default()
        };

        if due.is_empty() {
            info!("no credentials due for rotation");
            return Ok(report);
        }

        for credential in &due {
            match self.rotate_one(credential, now) {
                RotationOutcome::Rotated { .. } => report.rotated += 1,
                RotationOutcome::Deferred => report.deferred += 1,
                RotationOutcome::Failed => report.failed += 1,
            }
        }

        info!(
            due = report.due,
            rotated = report.rotated,
            deferred = report.deferred,
            failed = report.failed,
            "credential rotation pass finished"
        );
        Ok(report)
    }

    /// Attempt to rotate a single credential.
    pub fn rotate_one(&self, credential: &StoredCredential, now: DateTime<Utc>) -> RotationOutcome {
        let subject = credential.subject_id.as_str();

        match self.vault.refresh_stored(credential, now) {
            Ok(expires_at) => {
                let mut event = AuditEvent::new(SYSTEM_ACTOR, ACTION_CREDENTIAL_AUTO_ROTATED)
                    .target(subject)
                    .meta("provider", credential.provider.as_str());
                if let Some(hash) = &credential.identifier_hash {
                    event = event.meta("identifier_hash", hash.as_str());
                }
                self.audit.append(event);

                info!(credential_id = credential.id, %expires_at, "credential rotated");
                RotationOutcome::Rotated { expires_at }
            }
            Err(HealthGuardError::ExternalProvider(reason)) => {
                warn!(
                    credential_id = credential.id,
                    %reason,
                    "identity provider refresh failed, will retry next cycle"
                );
                RotationOutcome::Deferred
            }
            Err(HealthGuardError::DecryptionFailed) => {
                self.alerts
                    .raise(&OperationalAlert::credential_undecryptable(subject));
                RotationOutcome::Failed
            }
            Err(e) => {
                error!(credential_id = credential.id, error = %e, "credential rotation failed");
                RotationOutcome::Failed
            }
        }
    }
}
