//! Audit log: hash-chained history of every security-relevant action.
//!
//! Each entry stores the SHA-256 digest of its own canonical fields and
//! the digest of the entry before it, so any retroactive edit shows up
//! when the chain is recomputed. Entries are never updated or deleted
//! through this module.
//!
//! Writes are best-effort from the caller's point of view: a failed
//! append raises an operational alert but never fails the action being
//! recorded.

pub mod alert;
pub mod chain;
pub mod entry;
pub mod query;

pub use alert::{AlertSink, OperationalAlert, RecordingAlertSink, TracingAlertSink};
pub use chain::{AppendOutcome, ChainVerification, HashChainAuditLog};
pub use entry::{AuditEntry, AuditEvent, AuditRecord, GENESIS_HASH, SYSTEM_ACTOR};
pub use query::{AuditPage, AuditReader, VerificationReport};
