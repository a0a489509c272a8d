//! Operational alerts for monitoring gaps (not security breaches).

use std::fmt::Display;
use std::sync::Mutex;

use tracing::error;

/// Something an operator should look at, e.g. a dropped audit write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationalAlert {
    pub kind: &'static str,
    pub message: String,
}

impl OperationalAlert {
    pub fn audit_write_failed(action: &str, err: &dyn Display) -> Self {
        Self {
            kind: "audit_write_failed",
            message: format!("audit entry for '{action}' was not recorded: {err}"),
        }
    }

    pub fn credential_undecryptable(subject_id: &str) -> Self {
        Self {
            kind: "credential_undecryptable",
            message: format!("stored refresh secret for subject '{subject_id}' failed authentication"),
        }
    }
}

/// Destination for operational alerts.
pub trait AlertSink: Send + Sync {
    fn raise(&self, alert: &OperationalAlert);
}

/// Default sink: an `error`-level event under the `healthguard::alert` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn raise(&self, alert: &OperationalAlert) {
        error!(target: "healthguard::alert", kind = alert.kind, "{}", alert.message);
    }
}

/// Sink that keeps alerts in memory, for tests and health checks.
#[derive(Debug, Default)]
pub struct RecordingAlertSink {
    alerts: Mutex<Vec<OperationalAlert>>,
}

impl RecordingAlertSink {
    pub fn alerts(&self) -> Vec<OperationalAlert> {
        self.alerts
            .lock()
            .map(|a| a.clone())
            .unwrap_or_default()
    }
}

impl AlertSink for RecordingAlertSink {
    fn raise(&self, alert: &OperationalAlert) {
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.push(alert.clone());
        }
    }
}
