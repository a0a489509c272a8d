//! CLI module: Clap argument parser, shared wiring, output helpers and
//! command implementations.

pub mod commands;
pub mod context;
pub mod output;

use clap::Parser;

/// HealthGuard administrative CLI: audit chain inspection, identifier
/// hashing and credential maintenance.
#[derive(Parser)]
#[command(
    name = "healthguard",
    about = "Tamper-evident audit log and credential security administration",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory containing .healthguard.toml (default: current directory)
    #[arg(long, default_value = ".", global = true)]
    pub dir: String,

    /// Database path, overriding config and HEALTHGUARD_DB
    #[arg(long, global = true)]
    pub db: Option<String>,
}

/// All available subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Recompute the audit hash chain and report broken links
    Verify,

    /// List audit entries, newest first
    Log {
        /// Page number, starting at 1
        #[arg(long, default_value = "1")]
        page: usize,
        /// Entries per page (1-1000)
        #[arg(long, default_value = "100")]
        limit: usize,
    },

    /// Show a single audit entry
    Show {
        /// Entry id
        id: i64,
    },

    /// Audit log statistics
    Stats,

    /// Hash an identifier with the server HMAC secret (reads HMAC_SECRET)
    Hash {
        /// Identifier class: national-id, health-id or document
        kind: String,
        /// Raw identifier value
        value: String,
        /// Append an identifier_verified audit entry with this actor
        #[arg(long)]
        record: Option<String>,
    },

    /// Run one credential rotation pass now
    Rotate,

    /// Run session cleanup and retention enforcement once
    Maintain,

    /// Run the rotation and maintenance scheduler until interrupted
    Schedule,
}
