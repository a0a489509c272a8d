//! `healthguard schedule`: run the background jobs in the foreground.
//!
//! Stops taking new ticks on Ctrl-C and waits for any running job.

use tracing::info;

use crate::cli::context::Context;
use crate::cli::output;
use crate::cli::Cli;
use crate::config::SecretMaterial;
use crate::errors::Result;

/// Execute the `schedule` command.
pub fn execute(cli: &Cli) -> Result<()> {
    let ctx = Context::open(cli)?;
    let secrets = SecretMaterial::from_env()?;
    let scheduler = ctx.scheduler(&secrets)?;

    output::info(&format!(
        "Scheduler running against {} (Ctrl-C to stop).",
        ctx.db_path.display()
    ));

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let handle = scheduler.spawn();
        let signal = tokio::signal::ctrl_c().await;
        info!("shutdown requested, waiting for running jobs");
        handle.stop().await;
        signal
    })?;

    output::success("Scheduler stopped.");
    Ok(())
}
