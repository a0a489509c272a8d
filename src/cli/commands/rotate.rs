//! `healthguard rotate`: run one credential rotation pass now.
//!
//! Reads HMAC_SECRET, ENCRYPTION_KEY and optionally
//! PROVIDER_CLIENT_SECRET from the environment.

use crate::cli::context::Context;
use crate::cli::output;
use crate::cli::Cli;
use crate::config::SecretMaterial;
use crate::errors::Result;

/// Execute the `rotate` command.
pub fn execute(cli: &Cli) -> Result<()> {
    let ctx = Context::open(cli)?;
    let secrets = SecretMaterial::from_env()?;
    let rotator = ctx.rotator(&secrets)?;

    let report = rotator.run_once()?;

    if report.due == 0 {
        output::info(&format!(
            "No credentials expire within the next {} hours.",
            rotator.lead().num_hours()
        ));
        return Ok(());
    }

    output::success(&format!(
        "Rotated {} of {} due credential(s).",
        report.rotated, report.due
    ));
    if report.deferred > 0 {
        output::warning(&format!(
            "{} deferred: identity provider unavailable, will retry next pass.",
            report.deferred
        ));
    }
    if report.failed > 0 {
        output::warning(&format!(
            "{} failed: see the error log for details.",
            report.failed
        ));
    }
    Ok(())
}
