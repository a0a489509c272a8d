//! Audit entry types and the canonical form they are hashed over.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::errors::Result;

/// Previous-hash value of the first entry in a chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

// ── Action constants ─────────────────────────────────────────────────────────

pub const ACTION_CREDENTIAL_LINKED: &str = "credential_linked";
pub const ACTION_CREDENTIAL_REFRESHED: &str = "credential_refreshed";
pub const ACTION_CREDENTIAL_AUTO_ROTATED: &str = "credential_auto_rotated";
pub const ACTION_CREDENTIAL_REVOKED: &str = "credential_revoked";
pub const ACTION_IDENTIFIER_VERIFIED: &str = "identifier_verified";

/// Actor recorded for actions taken by background jobs.
pub const SYSTEM_ACTOR: &str = "system";

// ── AuditEvent ───────────────────────────────────────────────────────────────

/// What a caller asks to record. The chain fields are filled in on append.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    pub actor: String,
    pub action: String,
    pub target_id: Option<String>,
    pub metadata: Map<String, Value>,
}

impl AuditEvent {
    pub fn new(actor: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            action: action.into(),
            target_id: None,
            metadata: Map::new(),
        }
    }

    pub fn target(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

// ── AuditRecord / AuditEntry ─────────────────────────────────────────────────

/// A fully chained entry ready to be persisted (id not yet allocated).
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub actor: String,
    pub action: String,
    pub target_id: Option<String>,
    pub metadata: Value,
    pub previous_hash: String,
    pub self_hash: String,
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    /// Link `event` onto `previous_hash`, stamping it with `created_at`.
    pub fn chain(event: AuditEvent, previous_hash: &str, created_at: DateTime<Utc>) -> Result<Self> {
        // Storage keeps microseconds; hash what will be read back.
        let created_at = created_at.trunc_subsecs(6);
        let metadata = Value::Object(event.metadata);
        let self_hash = compute_hash(
            &event.actor,
            &event.action,
            event.target_id.as_deref(),
            &metadata,
            previous_hash,
            &created_at,
        )?;

        Ok(Self {
            actor: event.actor,
            action: event.action,
            target_id: event.target_id,
            metadata,
            previous_hash: previous_hash.to_string(),
            self_hash,
            created_at,
        })
    }
}

/// One immutable, ordered record of a security-relevant action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub actor: String,
    pub action: String,
    pub target_id: Option<String>,
    pub metadata: Value,
    pub previous_hash: String,
    pub self_hash: String,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Recompute the digest of this entry's canonical fields.
    pub fn recompute_hash(&self) -> Result<String> {
        compute_hash(
            &self.actor,
            &self.action,
            self.target_id.as_deref(),
            &self.metadata,
            &self.previous_hash,
            &self.created_at,
        )
    }
}

// ── Canonical form ───────────────────────────────────────────────────────────

/// Field order here is the hashed order; do not reorder.
#[derive(Serialize)]
struct CanonicalEntry<'a> {
    actor: &'a str,
    action: &'a str,
    target_id: Option<&'a str>,
    metadata: &'a Value,
    prev_hash: &'a str,
    created_at: String,
}

/// Timestamp rendering used both in the canonical form and in storage.
pub fn canonical_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// SHA-256 (hex) over the canonical JSON of an entry's fields.
///
/// Object keys inside `metadata` serialize in sorted order, so two maps
/// with the same content always hash identically.
pub fn compute_hash(
    actor: &str,
    action: &str,
    target_id: Option<&str>,
    metadata: &Value,
    prev_hash: &str,
    created_at: &DateTime<Utc>,
) -> Result<String> {
    let canonical = CanonicalEntry {
        actor,
        action,
        target_id,
        metadata,
        prev_hash,
        created_at: canonical_timestamp(created_at),
    };
    let bytes = serde_json::to_vec(&canonical)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}
