//! `healthguard maintain`: one session cleanup and retention pass.

use chrono::Utc;

use crate::cli::context::Context;
use crate::cli::output;
use crate::cli::Cli;
use crate::errors::Result;
use crate::store::MaintenanceStore;

/// Execute the `maintain` command. Audit entries are never removed.
pub fn execute(cli: &Cli) -> Result<()> {
    let ctx = Context::open(cli)?;
    let now = Utc::now();

    let sessions = ctx.store.cleanup_expired_sessions(now)?;
    output::success(&format!("Removed {sessions} expired session(s)."));

    let days = ctx.settings.retention_days;
    let retained = ctx.store.enforce_retention(days, now)?;
    output::success(&format!(
        "Removed {retained} record(s) older than {days} days."
    ));
    Ok(())
}
