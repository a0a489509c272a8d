//! Auditor commands: `verify`, `log`, `show` and `stats`.
//!
//! Usage:
//!   healthguard verify                   # recompute the hash chain
//!   healthguard log --page 2 --limit 50  # newest first
//!   healthguard show 42
//!   healthguard stats

use console::style;

use crate::cli::context::Context;
use crate::cli::output;
use crate::cli::Cli;
use crate::errors::{HealthGuardError, Result};

/// Execute the `verify` command. A broken chain is a non-zero exit.
pub fn verify(cli: &Cli) -> Result<()> {
    let ctx = Context::open(cli)?;
    let report = ctx.reader().verify()?;

    if report.valid {
        output::success(&format!(
            "{} ({} entries checked)",
            report.message, report.checked
        ));
        return Ok(());
    }

    output::warning(&report.message);
    let ids: Vec<String> = report.broken_links.iter().map(i64::to_string).collect();
    output::field("broken entries", &ids.join(", "));
    output::field("checked", &report.checked.to_string());
    Err(HealthGuardError::CommandFailed(
        "audit chain verification failed".into(),
    ))
}

/// Execute the `log` command.
pub fn log(cli: &Cli, page: usize, limit: usize) -> Result<()> {
    let ctx = Context::open(cli)?;
    let listing = ctx.reader().list(page, limit)?;

    if listing.entries.is_empty() {
        output::info(&format!(
            "No audit entries on page {} ({} total).",
            listing.page, listing.total
        ));
        return Ok(());
    }

    println!(
        "{}",
        style(format!(
            "Page {}/{} ({} entries total):",
            listing.page, listing.total_pages, listing.total
        ))
        .bold()
    );
    output::print_entries_table(&listing.entries);
    Ok(())
}

/// Execute the `show` command.
pub fn show(cli: &Cli, id: i64) -> Result<()> {
    let ctx = Context::open(cli)?;
    let entry = ctx.reader().get(id)?;

    println!("{}", style(format!("Audit entry #{}", entry.id)).bold());
    output::field("time", &entry.created_at.to_rfc3339());
    output::field("actor", &entry.actor);
    output::field("action", &entry.action);
    output::field("target", entry.target_id.as_deref().unwrap_or("-"));
    output::field("previous hash", &entry.previous_hash);
    output::field("hash", &entry.self_hash);

    let metadata = serde_json::to_string_pretty(&entry.metadata)?;
    output::field("metadata", &metadata);

    if entry.recompute_hash()? != entry.self_hash {
        output::warning("Stored hash does not match this entry's contents.");
    }
    Ok(())
}

/// Execute the `stats` command.
pub fn stats(cli: &Cli) -> Result<()> {
    let ctx = Context::open(cli)?;
    let stats = ctx.reader().stats()?;

    if stats.total_entries == 0 {
        output::info("The audit log is empty.");
        return Ok(());
    }

    output::field("total entries", &stats.total_entries.to_string());
    if let Some(first) = &stats.first_entry_at {
        output::field("first entry", &output::format_time(first));
    }
    if let Some(last) = &stats.last_entry_at {
        output::field("last entry", &output::format_time(last));
    }
    output::print_counts_table(["Action", "Count"], &stats.by_action);
    Ok(())
}
