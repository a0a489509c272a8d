//! Builds the runtime components a command needs from settings and the
//! process environment.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::audit::{AuditReader, HashChainAuditLog};
use crate::cli::Cli;
use crate::config::{SecretMaterial, Settings};
use crate::credentials::CredentialVault;
use crate::crypto::EnvelopeCipher;
use crate::errors::Result;
use crate::provider::HttpIdentityProvider;
use crate::rotation::{ScheduleConfig, Scheduler, TokenRotator};
use crate::store::SqliteStore;

/// Settings and the opened store for one CLI invocation.
pub struct Context {
    pub settings: Settings,
    pub db_path: PathBuf,
    pub store: Arc<SqliteStore>,
}

impl Context {
    /// Load settings (file, then environment, then `--db`) and open the store.
    pub fn open(cli: &Cli) -> Result<Self> {
        let dir = Path::new(&cli.dir);
        let mut settings = Settings::load(dir)?;
        if let Some(db) = &cli.db {
            settings.database_path = db.clone();
        }

        let db_path = settings.database_path(dir);
        debug!(path = %db_path.display(), "opening store");
        let store = Arc::new(SqliteStore::open(&db_path)?);

        Ok(Self {
            settings,
            db_path,
            store,
        })
    }

    pub fn audit_log(&self) -> Arc<HashChainAuditLog> {
        Arc::new(HashChainAuditLog::new(self.store.clone()))
    }

    pub fn reader(&self) -> AuditReader {
        AuditReader::new(self.audit_log())
    }

    /// Wire the rotator against the configured provider. Needs secrets.
    pub fn rotator(&self, secrets: &SecretMaterial) -> Result<Arc<TokenRotator>> {
        let audit = self.audit_log();
        let cipher = Arc::new(EnvelopeCipher::new(&secrets.master_key)?);
        let provider = HttpIdentityProvider::new(
            &self.settings.provider_name,
            &self.settings.provider_base_url,
            self.settings.provider_timeout(),
        )
        .with_client_credentials(
            self.settings.provider_client_id.clone(),
            secrets.provider_client_secret.clone(),
        );

        let vault = Arc::new(CredentialVault::new(
            self.store.clone(),
            cipher,
            Arc::new(provider),
            audit.clone(),
        ));
        Ok(Arc::new(TokenRotator::new(
            vault,
            audit,
            self.settings.rotation_lead(),
        )))
    }

    pub fn scheduler(&self, secrets: &SecretMaterial) -> Result<Scheduler> {
        Ok(Scheduler::new(
            self.rotator(secrets)?,
            self.store.clone(),
            ScheduleConfig::from(&self.settings),
        ))
    }
}
