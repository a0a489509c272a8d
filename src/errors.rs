use thiserror::Error;

/// All errors that can occur in HealthGuard.
///
/// Rate limiting and chain-integrity findings are outcomes, not errors:
/// see `RateDecision::Limited` and `ChainVerification { valid: false, .. }`.
#[derive(Debug, Error)]
pub enum HealthGuardError {
    // --- Input errors ---
    #[error("Validation failed: {0}")]
    Validation(String),

    // --- Crypto errors ---
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: authentication tag mismatch or corrupted data")]
    DecryptionFailed,

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("HMAC error: {0}")]
    HmacError(String),

    // --- Collaborator errors ---
    #[error("Identity provider error: {0}")]
    ExternalProvider(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("No credential found for {0}")]
    CredentialNotFound(String),

    #[error("Audit entry {0} not found")]
    AuditEntryNotFound(i64),

    // --- Config errors ---
    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Required secret {0} is not set")]
    MissingSecret(String),

    // --- IO errors ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // --- Serialization errors ---
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // --- CLI errors ---
    #[error("Command failed: {0}")]
    CommandFailed(String),
}

impl From<rusqlite::Error> for HealthGuardError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for HealthGuardError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

/// Convenience type alias for HealthGuard results.
pub type Result<T> = std::result::Result<T, HealthGuardError>;
