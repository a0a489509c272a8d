//! HealthGuard: tamper-evident audit log and credential security core.
//!
//! - [`crypto`]: identifier hashing, envelope encryption, key handling
//! - [`audit`]: hash-chained append-only log and its read surface
//! - [`credentials`]: encrypted third-party tokens and their lifecycle
//! - [`rotation`]: proactive token refresh and maintenance scheduling
//! - [`ratelimit`]: per-client request windows for write endpoints

pub mod audit;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod crypto;
pub mod errors;
pub mod logging;
pub mod provider;
pub mod ratelimit;
pub mod rotation;
pub mod store;
