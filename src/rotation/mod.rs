//! Credential rotation and the background maintenance scheduler.
//!
//! `TokenRotator` performs one pass over credentials inside the lead
//! window; `Scheduler` drives it, together with session cleanup and
//! retention enforcement, on independent timers.

pub mod rotator;
pub mod scheduler;

pub use rotator::{RotationOutcome, RotationReport, TokenRotator};
pub use scheduler::{ScheduleConfig, Scheduler, SchedulerHandle};
