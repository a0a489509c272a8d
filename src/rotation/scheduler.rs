//! Background cadences: credential rotation, session cleanup and
//! retention enforcement, each on its own timer.
//!
//! Jobs run on the blocking pool so store and provider calls never stall
//! the async workers. Shutdown stops new ticks; a job already running is
//! left to finish.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{info, warn};

use super::rotator::TokenRotator;
use crate::config::Settings;
use crate::store::MaintenanceStore;

/// Cadences and policy inputs for the scheduled jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub rotation_interval: Duration,
    pub session_cleanup_interval: Duration,
    pub retention_interval: Duration,
    pub retention_days: u32,
}

impl From<&Settings> for ScheduleConfig {
    fn from(s: &Settings) -> Self {
        Self {
            rotation_interval: Duration::from_secs(s.rotation_interval_secs),
            session_cleanup_interval: Duration::from_secs(s.session_cleanup_interval_secs),
            retention_interval: Duration::from_secs(s.retention_interval_secs),
            retention_days: s.retention_days,
        }
    }
}

pub struct Scheduler {
    rotator: Arc<TokenRotator>,
    maintenance: Arc<dyn MaintenanceStore>,
    config: ScheduleConfig,
}

impl Scheduler {
    pub fn new(
        rotator: Arc<TokenRotator>,
        maintenance: Arc<dyn MaintenanceStore>,
        config: ScheduleConfig,
    ) -> Self {
        Self {
            rotator,
            maintenance,
            config,
        }
    }

    /// Start all three jobs on the current Tokio runtime.
    ///
    /// The first run of each job happens one full interval after start.
    pub fn spawn(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let rotator = self.rotator;
        let rotation = spawn_job(
            "credential_rotation",
            self.config.rotation_interval,
            shutdown_rx.clone(),
            move || {
                if let Err(e) = rotator.run_once() {
                    warn!(error = %e, "credential rotation pass aborted");
                }
            },
        );

        let store = Arc::clone(&self.maintenance);
        let cleanup = spawn_job(
            "session_cleanup",
            self.config.session_cleanup_interval,
            shutdown_rx.clone(),
            move || match store.cleanup_expired_sessions(Utc::now()) {
                Ok(removed) => info!(removed, "expired sessions cleaned up"),
                Err(e) => warn!(error = %e, "session cleanup failed"),
            },
        );

        let store = Arc::clone(&self.maintenance);
        let retention_days = self.config.retention_days;
        let retention = spawn_job(
            "retention_policy",
            self.config.retention_interval,
            shutdown_rx,
            move || match store.enforce_retention(retention_days, Utc::now()) {
                Ok(removed) => info!(removed, retention_days, "retention policy enforced"),
                Err(e) => warn!(error = %e, "retention policy enforcement failed"),
            },
        );

        info!(
            rotation_secs = self.config.rotation_interval.as_secs(),
            cleanup_secs = self.config.session_cleanup_interval.as_secs(),
            retention_secs = self.config.retention_interval.as_secs(),
            "scheduler started"
        );

        SchedulerHandle {
            shutdown: shutdown_tx,
            tasks: vec![rotation, cleanup, retention],
        }
    }
}

/// Controls a running scheduler.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Stop accepting new ticks. In-flight jobs run to completion.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Wait for every job loop to exit.
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "scheduler task ended abnormally");
            }
        }
    }

    /// `shutdown` followed by `join`.
    pub async fn stop(self) {
        self.shutdown();
        self.join().await;
    }
}

/// Run `job` every `every` until `shutdown` flips or its sender drops.
pub(crate) fn spawn_job<F>(
    name: &'static str,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
    job: F,
) -> JoinHandle<()>
where
    F: Fn() + Send + Sync + 'static,
{
    let job = Arc::new(job);
    tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }

            let job = Arc::clone(&job);
            if let Err(e) = tokio::task::spawn_blocking(move || job()).await {
                warn!(job = name, error = %e, "scheduled job panicked");
            }
        }

        info!(job = name, "scheduled job stopped");
    })
}
