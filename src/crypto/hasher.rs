//! Keyed one-way hashing of sensitive identifiers.
//!
//! Identifiers are cleaned (separators stripped), validated against the
//! fixed format of their class, then digested with HMAC-SHA256 under the
//! server-held secret. Only the digest and a short display fragment leave
//! this module; there is no reverse operation.

use std::fmt;
use std::str::FromStr;

use hmac::{Hmac, Mac};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::keys::HmacSecret;
use crate::errors::{HealthGuardError, Result};

/// Number of trailing characters kept for display.
pub const DISPLAY_FRAGMENT_LEN: usize = 4;

/// The class of a sensitive identifier, which fixes its accepted format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdentifierKind {
    /// 12-digit national identity number.
    NationalId,
    /// 14-digit health account number (dashes allowed on input).
    HealthId,
    /// 6 to 20 alphanumerics, case-insensitive (passport, licence, ...).
    DocumentNumber,
}

impl IdentifierKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NationalId => "national-id",
            Self::HealthId => "health-id",
            Self::DocumentNumber => "document",
        }
    }

    fn pattern(self) -> &'static str {
        match self {
            Self::NationalId => r"^[0-9]{12}$",
            Self::HealthId => r"^[0-9]{14}$",
            Self::DocumentNumber => r"^[A-Z0-9]{6,20}$",
        }
    }

    /// Strip the separators this class tolerates on input.
    fn clean(self, raw: &str) -> String {
        match self {
            Self::NationalId => raw.chars().filter(|c| !c.is_whitespace()).collect(),
            Self::HealthId => raw
                .chars()
                .filter(|c| !c.is_whitespace() && *c != '-')
                .collect(),
            Self::DocumentNumber => raw
                .chars()
                .filter(|c| !c.is_whitespace() && *c != '-')
                .map(|c| c.to_ascii_uppercase())
                .collect(),
        }
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdentifierKind {
    type Err = HealthGuardError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "national-id" => Ok(Self::NationalId),
            "health-id" => Ok(Self::HealthId),
            "document" => Ok(Self::DocumentNumber),
            other => Err(HealthGuardError::Validation(format!(
                "unknown identifier kind '{other}' (use national-id, health-id or document)"
            ))),
        }
    }
}

/// A sensitive identifier after irreversible transformation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashedIdentifier {
    pub kind: IdentifierKind,
    /// 64-character lower-case hex HMAC-SHA256 digest.
    pub hash: String,
    /// Last characters of the cleaned identifier, safe for display.
    pub display_fragment: String,
}

impl HashedIdentifier {
    /// Masked rendering for UIs, e.g. `**-****-****-1234`.
    pub fn masked(&self) -> String {
        match self.kind {
            IdentifierKind::HealthId => format!("**-****-****-{}", self.display_fragment),
            IdentifierKind::NationalId => format!("XXXX-XXXX-{}", self.display_fragment),
            IdentifierKind::DocumentNumber => format!("****{}", self.display_fragment),
        }
    }

    /// Compare against a stored digest in constant time.
    pub fn matches(&self, stored_hash: &str) -> bool {
        self.hash.as_bytes().ct_eq(stored_hash.as_bytes()).into()
    }
}

/// HMAC-SHA256 hasher for identifiers, keyed by the server secret.
pub struct IdentifierHasher {
    secret: HmacSecret,
    national_id: Regex,
    health_id: Regex,
    document: Regex,
}

impl IdentifierHasher {
    pub fn new(secret: HmacSecret) -> Result<Self> {
        let compile = |kind: IdentifierKind| {
            Regex::new(kind.pattern())
                .map_err(|e| HealthGuardError::ConfigError(format!("identifier pattern: {e}")))
        };
        Ok(Self {
            national_id: compile(IdentifierKind::NationalId)?,
            health_id: compile(IdentifierKind::HealthId)?,
            document: compile(IdentifierKind::DocumentNumber)?,
            secret,
        })
    }

    /// Validate and hash `identifier` as an identifier of class `kind`.
    ///
    /// The same input always yields the same digest under a fixed secret.
    pub fn hash(&self, kind: IdentifierKind, identifier: &str) -> Result<HashedIdentifier> {
        let cleaned = kind.clean(identifier);
        if !self.format_for(kind).is_match(&cleaned) {
            return Err(HealthGuardError::Validation(format!(
                "invalid {kind} format"
            )));
        }

        let hash = self.hmac_hex(cleaned.as_bytes())?;
        let display_fragment = cleaned[cleaned.len() - DISPLAY_FRAGMENT_LEN..].to_string();

        Ok(HashedIdentifier {
            kind,
            hash,
            display_fragment,
        })
    }

    /// Hash an arbitrary non-empty value with no format check.
    pub fn hash_value(&self, data: &str) -> Result<String> {
        if data.is_empty() {
            return Err(HealthGuardError::Validation(
                "cannot hash an empty value".into(),
            ));
        }
        self.hmac_hex(data.as_bytes())
    }

    fn format_for(&self, kind: IdentifierKind) -> &Regex {
        match kind {
            IdentifierKind::NationalId => &self.national_id,
            IdentifierKind::HealthId => &self.health_id,
            IdentifierKind::DocumentNumber => &self.document,
        }
    }

    fn hmac_hex(&self, data: &[u8]) -> Result<String> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret.as_bytes())
            .map_err(|e| HealthGuardError::HmacError(format!("invalid HMAC key: {e}")))?;
        mac.update(data);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}
