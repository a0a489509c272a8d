//! `healthguard hash`: hash an identifier the way the service stores it.
//!
//! Usage:
//!   HMAC_SECRET=... healthguard hash health-id 91-1234-5678-4321
//!   HMAC_SECRET=... healthguard hash national-id 123456789012 --record support-7

use crate::audit::entry::ACTION_IDENTIFIER_VERIFIED;
use crate::audit::AuditEvent;
use crate::cli::context::Context;
use crate::cli::output;
use crate::cli::Cli;
use crate::config::SecretMaterial;
use crate::crypto::{IdentifierHasher, IdentifierKind};
use crate::errors::{HealthGuardError, Result};

/// Execute the `hash` command.
///
/// The digest goes to stdout on its own line so scripts can capture it.
/// With `record_as`, an `identifier_verified` entry is appended with
/// that actor; the raw value is never recorded.
pub fn execute(cli: &Cli, kind: &str, value: &str, record_as: Option<&str>) -> Result<()> {
    let kind: IdentifierKind = kind.parse()?;
    let secret = SecretMaterial::hmac_from_lookup(|name| std::env::var(name).ok())?;
    let hasher = IdentifierHasher::new(secret)?;

    let hashed = hasher.hash(kind, value)?;
    println!("{}", hashed.hash);
    output::field("kind", kind.as_str());
    output::field("display", &hashed.masked());

    if let Some(actor) = record_as {
        let ctx = Context::open(cli)?;
        let entry = ctx
            .audit_log()
            .try_append(
                AuditEvent::new(actor, ACTION_IDENTIFIER_VERIFIED)
                    .target(hashed.hash.as_str())
                    .meta("kind", kind.as_str())
                    .meta("identifier_last4", hashed.display_fragment.as_str()),
            )
            .map_err(|e| HealthGuardError::CommandFailed(format!("audit append failed: {e}")))?;
        output::success(&format!("Recorded as audit entry #{}", entry.id));
    }
    Ok(())
}
