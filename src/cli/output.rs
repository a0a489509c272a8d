//! Colored terminal output helpers.
//!
//! All user-facing output goes through these functions so every command
//! shares one look.

use comfy_table::{ContentArrangement, Table};
use console::style;

use crate::audit::entry::{
    ACTION_CREDENTIAL_AUTO_ROTATED, ACTION_CREDENTIAL_LINKED, ACTION_CREDENTIAL_REFRESHED,
    ACTION_CREDENTIAL_REVOKED,
};
use crate::audit::AuditEntry;

/// Hex characters of a digest shown in tables.
const SHORT_HASH_LEN: usize = 12;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn success(msg: &str) {
    println!("{} {}", style("\u{2713}").green().bold(), msg);
}

/// Errors go to stderr.
pub fn error(msg: &str) {
    eprintln!("{} {}", style("\u{2717}").red().bold(), msg);
}

pub fn warning(msg: &str) {
    eprintln!("{} {}", style("\u{26a0}").yellow().bold(), msg);
}

pub fn info(msg: &str) {
    println!("{} {}", style("\u{2139}").blue().bold(), msg);
}

/// A dim `label: value` line.
pub fn field(label: &str, value: &str) {
    println!("  {:<16} {}", style(format!("{label}:")).dim(), value);
}

/// First few characters of a digest, for compact display.
pub fn short_hash(hash: &str) -> &str {
    hash.get(..SHORT_HASH_LEN).unwrap_or(hash)
}

/// Print audit entries as a table (ID, Time, Actor, Action, Target, Hash).
pub fn print_entries_table(entries: &[AuditEntry]) {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["ID", "Time", "Actor", "Action", "Target", "Hash"]);

    for e in entries {
        table.add_row(vec![
            e.id.to_string(),
            e.created_at.format(TIME_FORMAT).to_string(),
            e.actor.clone(),
            colorize_action(&e.action),
            e.target_id.clone().unwrap_or_else(|| "-".to_string()),
            short_hash(&e.self_hash).to_string(),
        ]);
    }

    println!("{table}");
}

/// Print `(label, count)` rows as a two-column table.
pub fn print_counts_table(header: [&str; 2], rows: &[(String, u64)]) {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(header.to_vec());
    for (label, count) in rows {
        table.add_row(vec![colorize_action(label), count.to_string()]);
    }
    println!("{table}");
}

pub fn format_time(ts: &chrono::DateTime<chrono::Utc>) -> String {
    ts.format(TIME_FORMAT).to_string()
}

/// Colorize action names by family.
fn colorize_action(action: &str) -> String {
    match action {
        ACTION_CREDENTIAL_LINKED => style(action).green().to_string(),
        ACTION_CREDENTIAL_REFRESHED | ACTION_CREDENTIAL_AUTO_ROTATED => {
            style(action).cyan().to_string()
        }
        ACTION_CREDENTIAL_REVOKED => style(action).red().to_string(),
        a if a.starts_with("identifier_") => style(action).blue().to_string(),
        _ => action.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_hash_truncates_long_digests() {
        let digest = "a".repeat(64);
        assert_eq!(short_hash(&digest).len(), SHORT_HASH_LEN);
        assert_eq!(short_hash("abc"), "abc");
    }

    #[test]
    fn colorize_keeps_action_text() {
        console::set_colors_enabled(false);
        assert_eq!(colorize_action(ACTION_CREDENTIAL_LINKED), ACTION_CREDENTIAL_LINKED);
        assert_eq!(colorize_action("custom_action"), "custom_action");
    }
}
