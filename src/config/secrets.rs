//! Secret material supplied through the process environment.
//!
//! Secrets never live in `.healthguard.toml`; they are read once at
//! startup, validated, and turned into key types that zero themselves
//! on drop.

use std::fmt;

use zeroize::Zeroizing;

use crate::crypto::{HmacSecret, MasterKey};
use crate::errors::{HealthGuardError, Result};

pub const HMAC_SECRET_VAR: &str = "HMAC_SECRET";
pub const ENCRYPTION_KEY_VAR: &str = "ENCRYPTION_KEY";
pub const PROVIDER_CLIENT_SECRET_VAR: &str = "PROVIDER_CLIENT_SECRET";

/// Validated key material for the hasher, the cipher and the provider client.
pub struct SecretMaterial {
    pub hmac_secret: HmacSecret,
    pub master_key: MasterKey,
    pub provider_client_secret: Option<Zeroizing<String>>,
}

impl SecretMaterial {
    /// Read every secret from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read every secret through `lookup`.
    ///
    /// An unset secret is `MissingSecret`; one that is present but too
    /// short is `ConfigError`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let hmac = require(&lookup, HMAC_SECRET_VAR)?;
        let key = require(&lookup, ENCRYPTION_KEY_VAR)?;

        Ok(Self {
            hmac_secret: HmacSecret::new(&hmac)?,
            master_key: MasterKey::from_material(&key)?,
            provider_client_secret: lookup(PROVIDER_CLIENT_SECRET_VAR)
                .filter(|s| !s.is_empty())
                .map(Zeroizing::new),
        })
    }

    /// Only the HMAC secret, for commands that never touch credentials.
    pub fn hmac_from_lookup<F>(lookup: F) -> Result<HmacSecret>
    where
        F: Fn(&str) -> Option<String>,
    {
        let hmac = require(&lookup, HMAC_SECRET_VAR)?;
        HmacSecret::new(&hmac)
    }
}

impl fmt::Debug for SecretMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretMaterial")
            .field("hmac_secret", &self.hmac_secret)
            .field("master_key", &self.master_key)
            .field(
                "provider_client_secret",
                &self.provider_client_secret.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

fn require<F>(lookup: &F, name: &str) -> Result<Zeroizing<String>>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .filter(|v| !v.is_empty())
        .map(Zeroizing::new)
        .ok_or_else(|| HealthGuardError::MissingSecret(name.to_string()))
}
