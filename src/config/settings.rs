use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{HealthGuardError, Result};

/// Upper bound on the rotation lead window: one year.
pub const MAX_ROTATION_LEAD_HOURS: u64 = 365 * 24;

/// Upper bound on the retention period: one hundred years.
pub const MAX_RETENTION_DAYS: u64 = 36_500;

/// Upper bound on any interval or timeout: one year.
pub const MAX_INTERVAL_SECS: u64 = 365 * 24 * 3600;

/// Deployment configuration, loaded from `.healthguard.toml`.
///
/// Every field has a default so HealthGuard runs without any config file.
/// Environment variables override file values (see [`Settings::apply_env`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// SQLite database holding the audit log, credentials and sessions.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Credentials expiring within this many hours are rotated (default: 24).
    #[serde(default = "default_rotation_lead_hours")]
    pub rotation_lead_hours: u32,

    /// Seconds between rotation passes (default: 6 hours).
    #[serde(default = "default_rotation_interval_secs")]
    pub rotation_interval_secs: u64,

    /// Seconds between expired-session sweeps (default: daily).
    #[serde(default = "default_session_cleanup_interval_secs")]
    pub session_cleanup_interval_secs: u64,

    /// Seconds between retention passes (default: weekly).
    #[serde(default = "default_retention_interval_secs")]
    pub retention_interval_secs: u64,

    /// Sessions and stale credentials older than this are removed (default: 7 years).
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Rate limit window length in seconds (default: 15 minutes).
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,

    /// Requests admitted per client per window (default: 100).
    #[serde(default = "default_rate_limit_max_requests")]
    pub rate_limit_max_requests: u32,

    /// Seconds between sweeps of expired rate limit windows (default: hourly).
    #[serde(default = "default_rate_limit_sweep_secs")]
    pub rate_limit_sweep_secs: u64,

    /// Identity provider API root; the token endpoint is `<base>/auth/token`.
    #[serde(default = "default_provider_base_url")]
    pub provider_base_url: String,

    /// Name credentials from this provider are stored under.
    #[serde(default = "default_provider_name")]
    pub provider_name: String,

    /// Upper bound on a single provider call, in seconds (default: 10).
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,

    #[serde(default)]
    pub provider_client_id: Option<String>,
}

// ── Serde default helpers ────────────────────────────────────────────

fn default_database_path() -> String {
    "healthguard.db".to_string()
}

fn default_rotation_lead_hours() -> u32 {
    24
}

fn default_rotation_interval_secs() -> u64 {
    6 * 3600
}

fn default_session_cleanup_interval_secs() -> u64 {
    24 * 3600
}

fn default_retention_interval_secs() -> u64 {
    7 * 24 * 3600
}

fn default_retention_days() -> u32 {
    2555 // 7 years
}

fn default_rate_limit_window_secs() -> u64 {
    15 * 60
}

fn default_rate_limit_max_requests() -> u32 {
    100
}

fn default_rate_limit_sweep_secs() -> u64 {
    3600
}

fn default_provider_base_url() -> String {
    "https://healthidsbx.abdm.gov.in/api/v1".to_string()
}

fn default_provider_name() -> String {
    "abha".to_string()
}

fn default_provider_timeout_secs() -> u64 {
    10
}

// ── Implementation ───────────────────────────────────────────────────

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            rotation_lead_hours: default_rotation_lead_hours(),
            rotation_interval_secs: default_rotation_interval_secs(),
            session_cleanup_interval_secs: default_session_cleanup_interval_secs(),
            retention_interval_secs: default_retention_interval_secs(),
            retention_days: default_retention_days(),
            rate_limit_window_secs: default_rate_limit_window_secs(),
            rate_limit_max_requests: default_rate_limit_max_requests(),
            rate_limit_sweep_secs: default_rate_limit_sweep_secs(),
            provider_base_url: default_provider_base_url(),
            provider_name: default_provider_name(),
            provider_timeout_secs: default_provider_timeout_secs(),
            provider_client_id: None,
        }
    }
}

impl Settings {
    /// Name of the config file we look for in the working directory.
    const FILE_NAME: &'static str = ".healthguard.toml";

    /// Load `<dir>/.healthguard.toml` and apply process environment overrides.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut settings = Self::load_file(dir)?;
        settings.apply_env(|name| std::env::var(name).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load `<dir>/.healthguard.toml` only.
    ///
    /// If the file does not exist, defaults are returned.
    /// If the file exists but cannot be parsed, an error is returned.
    pub fn load_file(dir: &Path) -> Result<Self> {
        let config_path = dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path)?;

        toml::from_str(&contents).map_err(|e| {
            HealthGuardError::ConfigError(format!("Failed to parse {}: {e}", config_path.display()))
        })
    }

    /// Apply overrides from an environment-like lookup.
    ///
    /// `RATE_LIMIT_WINDOW_MS` is in milliseconds and rounded up to whole
    /// seconds. A variable that is set but malformed is an error, never
    /// silently ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ms) = parse_var::<u64, _>(&lookup, "RATE_LIMIT_WINDOW_MS")? {
            self.rate_limit_window_secs = ms.div_ceil(1000);
        }
        if let Some(n) = parse_var(&lookup, "RATE_LIMIT_MAX_REQUESTS")? {
            self.rate_limit_max_requests = n;
        }
        if let Some(days) = parse_var(&lookup, "AUDIT_LOG_RETENTION_DAYS")? {
            self.retention_days = days;
        }
        if let Some(hours) = parse_var(&lookup, "ROTATION_LEAD_HOURS")? {
            self.rotation_lead_hours = hours;
        }
        if let Some(url) = non_empty(&lookup, "PROVIDER_BASE_URL") {
            self.provider_base_url = url;
        }
        if let Some(id) = non_empty(&lookup, "PROVIDER_CLIENT_ID") {
            self.provider_client_id = Some(id);
        }
        if let Some(path) = non_empty(&lookup, "HEALTHGUARD_DB") {
            self.database_path = path;
        }
        Ok(())
    }

    /// Reject values that would make a scheduler or the limiter misbehave.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("rotation_interval_secs", self.rotation_interval_secs),
            ("session_cleanup_interval_secs", self.session_cleanup_interval_secs),
            ("retention_interval_secs", self.retention_interval_secs),
            ("rate_limit_window_secs", self.rate_limit_window_secs),
            ("rate_limit_sweep_secs", self.rate_limit_sweep_secs),
            ("provider_timeout_secs", self.provider_timeout_secs),
            ("rate_limit_max_requests", u64::from(self.rate_limit_max_requests)),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(HealthGuardError::ConfigError(format!(
                    "{name} must be greater than zero"
                )));
            }
        }

        let bounded = [
            ("rotation_lead_hours", u64::from(self.rotation_lead_hours), MAX_ROTATION_LEAD_HOURS),
            ("retention_days", u64::from(self.retention_days), MAX_RETENTION_DAYS),
            ("rotation_interval_secs", self.rotation_interval_secs, MAX_INTERVAL_SECS),
            ("session_cleanup_interval_secs", self.session_cleanup_interval_secs, MAX_INTERVAL_SECS),
            ("retention_interval_secs", self.retention_interval_secs, MAX_INTERVAL_SECS),
            ("rate_limit_window_secs", self.rate_limit_window_secs, MAX_INTERVAL_SECS),
            ("rate_limit_sweep_secs", self.rate_limit_sweep_secs, MAX_INTERVAL_SECS),
            ("provider_timeout_secs", self.provider_timeout_secs, MAX_INTERVAL_SECS),
        ];
        for (name, value, max) in bounded {
            if value > max {
                return Err(HealthGuardError::ConfigError(format!(
                    "{name} must be at most {max} (got {value})"
                )));
            }
        }
        Ok(())
    }

    /// Resolve the database path against `dir` unless it is absolute.
    pub fn database_path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.database_path)
    }

    pub fn rotation_lead(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.rotation_lead_hours))
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn rate_limit_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.rate_limit_sweep_secs)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }
}

fn non_empty<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match non_empty(lookup, name) {
        None => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|_| {
            HealthGuardError::ConfigError(format!("{name} must be a non-negative integer, got '{raw}'"))
        }),
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn default_settings_are_sensible() {
        let s = Settings::default();
        assert_eq!(s.database_path, "healthguard.db");
        assert_eq!(s.rotation_lead_hours, 24);
        assert_eq!(s.rate_limit_window_secs, 900);
        assert_eq!(s.rate_limit_max_requests, 100);
        assert_eq!(s.retention_days, 2555);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn load_file_returns_defaults_when_missing() {
        let tmp = TempDir::new().unwrap();
        let settings = Settings::load_file(tmp.path()).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn load_file_parses_toml_and_keeps_defaults_for_missing_fields() {
        let tmp = TempDir::new().unwrap();
        let config = r#"
database_path = "audit.db"
rotation_lead_hours = 48
rate_limit_max_requests = 5
"#;
        fs::write(tmp.path().join(".healthguard.toml"), config).unwrap();

        let settings = Settings::load_file(tmp.path()).unwrap();
        assert_eq!(settings.database_path, "audit.db");
        assert_eq!(settings.rotation_lead_hours, 48);
        assert_eq!(settings.rate_limit_max_requests, 5);
        assert_eq!(settings.rate_limit_window_secs, 900);
    }

    #[test]
    fn load_file_errors_on_invalid_toml() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(".healthguard.toml"), "not valid {{toml").unwrap();
        assert!(matches!(
            Settings::load_file(tmp.path()),
            Err(HealthGuardError::ConfigError(_))
        ));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut s = Settings::default();
        s.apply_env(env(&[
            ("RATE_LIMIT_WINDOW_MS", "60500"),
            ("RATE_LIMIT_MAX_REQUESTS", "5"),
            ("AUDIT_LOG_RETENTION_DAYS", "30"),
            ("ROTATION_LEAD_HOURS", "12"),
            ("HEALTHGUARD_DB", "/var/lib/hg.db"),
            ("PROVIDER_CLIENT_ID", "client-1"),
        ]))
        .unwrap();

        assert_eq!(s.rate_limit_window_secs, 61);
        assert_eq!(s.rate_limit_max_requests, 5);
        assert_eq!(s.retention_days, 30);
        assert_eq!(s.rotation_lead(), chrono::Duration::hours(12));
        assert_eq!(s.database_path, "/var/lib/hg.db");
        assert_eq!(s.provider_client_id.as_deref(), Some("client-1"));
    }

    #[test]
    fn malformed_env_value_is_config_error() {
        let mut s = Settings::default();
        let err = s
            .apply_env(env(&[("RATE_LIMIT_MAX_REQUESTS", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("RATE_LIMIT_MAX_REQUESTS"));
    }

    #[test]
    fn blank_env_value_is_ignored() {
        let mut s = Settings::default();
        s.apply_env(env(&[("ROTATION_LEAD_HOURS", "  ")])).unwrap();
        assert_eq!(s.rotation_lead_hours, 24);
    }

    #[test]
    fn zero_interval_fails_validation() {
        let s = Settings {
            rate_limit_window_secs: 0,
            ..Settings::default()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn oversized_values_fail_validation() {
        let retention = Settings {
            retention_days: 4_000_000_000,
            ..Settings::default()
        };
        let err = retention.validate().unwrap_err();
        assert!(err.to_string().contains("retention_days"));

        let lead = Settings {
            rotation_lead_hours: u32::MAX,
            ..Settings::default()
        };
        assert!(lead.validate().is_err());

        let sweep = Settings {
            rate_limit_sweep_secs: u64::MAX,
            ..Settings::default()
        };
        assert!(sweep.validate().is_err());

        let at_limit = Settings {
            retention_days: MAX_RETENTION_DAYS as u32,
            rotation_lead_hours: MAX_ROTATION_LEAD_HOURS as u32,
            ..Settings::default()
        };
        assert!(at_limit.validate().is_ok());
    }

    #[test]
    fn oversized_env_override_fails_validation() {
        let mut s = Settings::default();
        s.apply_env(env(&[("AUDIT_LOG_RETENTION_DAYS", "4000000000")]))
            .unwrap();
        assert!(matches!(s.validate(), Err(HealthGuardError::ConfigError(_))));
    }

    #[test]
    fn database_path_respects_absolute_paths() {
        let s = Settings {
            database_path: "/data/hg.db".to_string(),
            ..Settings::default()
        };
        assert_eq!(s.database_path(Path::new("/srv")), PathBuf::from("/data/hg.db"));
        assert_eq!(
            Settings::default().database_path(Path::new("/srv")),
            PathBuf::from("/srv/healthguard.db")
        );
    }
}
