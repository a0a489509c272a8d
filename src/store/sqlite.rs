//! SQLite-backed implementation of the storage contracts.
//!
//! One database holds three tables: `audit_log` (append-only, guarded by
//! triggers), `credentials` (one row per subject and provider) and
//! `sessions`. Timestamps are stored as fixed-width RFC 3339 UTC strings
//! so they compare correctly as text.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use tracing::info;

use super::{AuditStats, AuditStore, CredentialStore, MaintenanceStore};
use crate::audit::entry::canonical_timestamp;
use crate::audit::{AuditEntry, AuditRecord};
use crate::credentials::{CredentialUpdate, StoredCredential};
use crate::crypto::EncryptedSecret;
use crate::errors::{HealthGuardError, Result};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS audit_log (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    actor       TEXT NOT NULL,
    action      TEXT NOT NULL,
    target_id   TEXT,
    metadata    TEXT NOT NULL,
    prev_hash   TEXT NOT NULL,
    hash        TEXT NOT NULL,
    created_at  TEXT NOT NULL
);
CREATE TRIGGER IF NOT EXISTS audit_log_no_update
    BEFORE UPDATE ON audit_log
    BEGIN SELECT RAISE(ABORT, 'audit_log is append-only'); END;
CREATE TRIGGER IF NOT EXISTS audit_log_no_delete
    BEFORE DELETE ON audit_log
    BEGIN SELECT RAISE(ABORT, 'audit_log is append-only'); END;

CREATE TABLE IF NOT EXISTS credentials (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    subject_id          TEXT NOT NULL,
    provider            TEXT NOT NULL,
    identifier_hash     TEXT,
    identifier_display  TEXT,
    access_ciphertext   TEXT NOT NULL,
    access_iv           TEXT NOT NULL,
    access_tag          TEXT NOT NULL,
    refresh_ciphertext  TEXT NOT NULL,
    refresh_iv          TEXT NOT NULL,
    refresh_tag         TEXT NOT NULL,
    expires_at          TEXT NOT NULL,
    last_refreshed_at   TEXT NOT NULL,
    UNIQUE (subject_id, provider)
);
CREATE INDEX IF NOT EXISTS credentials_expiry ON credentials (provider, expires_at);

CREATE TABLE IF NOT EXISTS sessions (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    subject_id  TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    expires_at  TEXT NOT NULL
);
";

const ENTRY_COLUMNS: &str =
    "id, actor, action, target_id, metadata, prev_hash, hash, created_at";

const CREDENTIAL_COLUMNS: &str = "id, subject_id, provider, identifier_hash, identifier_display,
     access_ciphertext, access_iv, access_tag,
     refresh_ciphertext, refresh_iv, refresh_tag,
     expires_at, last_refreshed_at";

/// SQLite store shared by request handlers and the scheduler.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Set restrictive permissions on the database (owner-only).
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(path, perms);
        }

        Self::with_connection(conn)
    }

    /// A private in-memory database, mainly for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| HealthGuardError::Storage("connection lock poisoned".into()))
    }

    /// Record a login session for `subject_id`.
    pub fn insert_session(
        &self,
        subject_id: &str,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sessions (subject_id, created_at, expires_at) VALUES (?1, ?2, ?3)",
            params![
                subject_id,
                canonical_timestamp(&created_at),
                canonical_timestamp(&expires_at)
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn session_count(&self) -> Result<u64> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(to_u64(n))
    }
}

// ── AuditStore ───────────────────────────────────────────────────────────────

impl AuditStore for SqliteStore {
    fn append_entry(&self, record: &AuditRecord) -> Result<i64> {
        let metadata = serde_json::to_string(&record.metadata)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO audit_log (actor, action, target_id, metadata, prev_hash, hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.actor,
                record.action,
                record.target_id,
                metadata,
                record.previous_hash,
                record.self_hash,
                canonical_timestamp(&record.created_at),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn latest_entry(&self) -> Result<Option<AuditEntry>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM audit_log ORDER BY id DESC LIMIT 1");
        Ok(conn.query_row(&sql, [], row_to_entry).optional()?)
    }

    fn entries_in_order(&self) -> Result<Vec<AuditEntry>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM audit_log ORDER BY id ASC");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_entry)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn entry_by_id(&self, id: i64) -> Result<Option<AuditEntry>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM audit_log WHERE id = ?1");
        Ok(conn.query_row(&sql, params![id], row_to_entry).optional()?)
    }

    fn page(&self, offset: usize, limit: usize) -> Result<Vec<AuditEntry>> {
        let conn = self.conn()?;
        let sql =
            format!("SELECT {ENTRY_COLUMNS} FROM audit_log ORDER BY id DESC LIMIT ?1 OFFSET ?2");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![to_i64(limit), to_i64(offset)], row_to_entry)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn count(&self) -> Result<u64> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))?;
        Ok(to_u64(n))
    }

    fn stats(&self) -> Result<AuditStats> {
        let conn = self.conn()?;

        let (total, first, last): (i64, Option<String>, Option<String>) = conn.query_row(
            "SELECT COUNT(*), MIN(created_at), MAX(created_at) FROM audit_log",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        let mut stmt = conn.prepare(
            "SELECT action, COUNT(*) AS n FROM audit_log
             GROUP BY action ORDER BY n DESC, action ASC",
        )?;
        let by_action = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, to_u64(row.get::<_, i64>(1)?)))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(AuditStats {
            total_entries: to_u64(total),
            by_action,
            first_entry_at: first.as_deref().map(parse_timestamp),
            last_entry_at: last.as_deref().map(parse_timestamp),
        })
    }
}

// ── CredentialStore ──────────────────────────────────────────────────────────

impl CredentialStore for SqliteStore {
    fn upsert_credential(&self, c: &StoredCredential) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO credentials (
                 subject_id, provider, identifier_hash, identifier_display,
                 access_ciphertext, access_iv, access_tag,
                 refresh_ciphertext, refresh_iv, refresh_tag,
                 expires_at, last_refreshed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT (subject_id, provider) DO UPDATE SET
                 identifier_hash    = excluded.identifier_hash,
                 identifier_display = excluded.identifier_display,
                 access_ciphertext  = excluded.access_ciphertext,
                 access_iv          = excluded.access_iv,
                 access_tag         = excluded.access_tag,
                 refresh_ciphertext = excluded.refresh_ciphertext,
                 refresh_iv         = excluded.refresh_iv,
                 refresh_tag        = excluded.refresh_tag,
                 expires_at         = excluded.expires_at,
                 last_refreshed_at  = excluded.last_refreshed_at",
            params![
                c.subject_id,
                c.provider,
                c.identifier_hash,
                c.identifier_display,
                c.access.ciphertext,
                c.access.iv,
                c.access.tag,
                c.refresh.ciphertext,
                c.refresh.iv,
                c.refresh.tag,
                canonical_timestamp(&c.expires_at),
                canonical_timestamp(&c.last_refreshed_at),
            ],
        )?;

        let id = conn.query_row(
            "SELECT id FROM credentials WHERE subject_id = ?1 AND provider = ?2",
            params![c.subject_id, c.provider],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn credential_for(&self, subject_id: &str, provider: &str) -> Result<Option<StoredCredential>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM credentials WHERE subject_id = ?1 AND provider = ?2"
        );
        Ok(conn
            .query_row(&sql, params![subject_id, provider], row_to_credential)
            .optional()?)
    }

    fn credentials_due_for_rotation(
        &self,
        provider: &str,
        threshold: DateTime<Utc>,
    ) -> Result<Vec<StoredCredential>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM credentials
             WHERE provider = ?1 AND expires_at < ?2
             ORDER BY expires_at ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![provider, canonical_timestamp(&threshold)],
            row_to_credential,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn update_credential(&self, id: i64, u: &CredentialUpdate) -> Result<()> {
        let conn = self.conn()?;
        let refresh = u.refresh.as_ref();
        let changed = conn.execute(
            "UPDATE credentials SET
                 access_ciphertext  = ?2,
                 access_iv          = ?3,
                 access_tag         = ?4,
                 refresh_ciphertext = COALESCE(?5, refresh_ciphertext),
                 refresh_iv         = COALESCE(?6, refresh_iv),
                 refresh_tag        = COALESCE(?7, refresh_tag),
                 expires_at         = ?8,
                 last_refreshed_at  = ?9
             WHERE id = ?1",
            params![
                id,
                u.access.ciphertext,
                u.access.iv,
                u.access.tag,
                refresh.map(|r| r.ciphertext.as_str()),
                refresh.map(|r| r.iv.as_str()),
                refresh.map(|r| r.tag.as_str()),
                canonical_timestamp(&u.expires_at),
                canonical_timestamp(&u.last_refreshed_at),
            ],
        )?;

        if changed == 0 {
            return Err(HealthGuardError::CredentialNotFound(format!(
                "credential id {id}"
            )));
        }
        Ok(())
    }

    fn delete_credential(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM credentials WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }
}

// ── MaintenanceStore ─────────────────────────────────────────────────────────

impl MaintenanceStore for SqliteStore {
    fn cleanup_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM sessions WHERE expires_at < ?1",
            params![canonical_timestamp(&now)],
        )?;
        Ok(removed)
    }

    fn enforce_retention(&self, retention_days: u32, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = Duration::try_days(i64::from(retention_days))
            .and_then(|period| now.checked_sub_signed(period))
            .ok_or_else(|| {
                HealthGuardError::ConfigError(format!(
                    "retention period of {retention_days} days is out of range"
                ))
            })?;
        let cutoff = canonical_timestamp(&cutoff);
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let sessions = tx.execute("DELETE FROM sessions WHERE created_at < ?1", params![cutoff])?;
        let credentials = tx.execute(
            "DELETE FROM credentials WHERE last_refreshed_at < ?1",
            params![cutoff],
        )?;
        tx.commit()?;

        if sessions + credentials > 0 {
            info!(sessions, credentials, retention_days, "retention policy removed rows");
        }
        Ok(sessions + credentials)
    }
}

// ── Row mapping ──────────────────────────────────────────────────────────────

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<AuditEntry> {
    let metadata: String = row.get(4)?;
    let created_at: String = row.get(7)?;

    // Unparseable columns are kept as sentinel values rather than failing
    // the read; the digest check then flags the entry as broken.
    Ok(AuditEntry {
        id: row.get(0)?,
        actor: row.get(1)?,
        action: row.get(2)?,
        target_id: row.get(3)?,
        metadata: serde_json::from_str(&metadata).unwrap_or(Value::Null),
        previous_hash: row.get(5)?,
        self_hash: row.get(6)?,
        created_at: parse_timestamp(&created_at),
    })
}

fn row_to_credential(row: &Row<'_>) -> rusqlite::Result<StoredCredential> {
    let expires_at: String = row.get(11)?;
    let last_refreshed_at: String = row.get(12)?;

    Ok(StoredCredential {
        id: row.get(0)?,
        subject_id: row.get(1)?,
        provider: row.get(2)?,
        identifier_hash: row.get(3)?,
        identifier_display: row.get(4)?,
        access: EncryptedSecret {
            ciphertext: row.get(5)?,
            iv: row.get(6)?,
            tag: row.get(7)?,
        },
        refresh: EncryptedSecret {
            ciphertext: row.get(8)?,
            iv: row.get(9)?,
            tag: row.get(10)?,
        },
        expires_at: parse_timestamp(&expires_at),
        last_refreshed_at: parse_timestamp(&last_refreshed_at),
    })
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or(DateTime::<Utc>::UNIX_EPOCH, |dt| dt.with_timezone(&Utc))
}

fn to_u64(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
