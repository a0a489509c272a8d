//! Fixed-window request limiter for write-heavy endpoints.
//!
//! Windows are keyed by a truncated keyed digest of the client address,
//! so the map never holds a raw IP. State is process-local: a second
//! instance of the service keeps its own counters.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use zeroize::Zeroizing;

use crate::config::Settings;
use crate::crypto::keys::KEY_LEN;
use crate::crypto::HmacSecret;
use crate::errors::{HealthGuardError, Result};
use crate::rotation::scheduler::spawn_job;

/// Hex characters kept from the client address digest.
pub const CLIENT_KEY_LEN: usize = 16;

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    /// Over the limit; the caller should answer with a retry hint.
    Limited { retry_after_secs: u64 },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Anything that can admit or refuse a request from a client address.
///
/// A shared counter store can sit behind this without touching callers.
pub trait RateLimit: Send + Sync {
    fn check(&self, client_addr: &str) -> Result<RateDecision>;
}

/// Maps client addresses to short keyed digests.
pub struct ClientKeyHasher {
    key: Zeroizing<[u8; KEY_LEN]>,
}

impl ClientKeyHasher {
    pub fn new(secret: &HmacSecret) -> Result<Self> {
        Ok(Self {
            key: secret.derive_client_key()?,
        })
    }

    pub fn key_for(&self, client_addr: &str) -> Result<String> {
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.key[..])
            .map_err(|e| HealthGuardError::HmacError(format!("invalid HMAC key: {e}")))?;
        mac.update(client_addr.as_bytes());
        let mut digest = hex::encode(mac.finalize().into_bytes());
        digest.truncate(CLIENT_KEY_LEN);
        Ok(digest)
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: Instant,
}

pub struct RateLimiter {
    keys: ClientKeyHasher,
    window: Duration,
    max_requests: u32,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(keys: ClientKeyHasher, window: Duration, max_requests: u32) -> Self {
        Self {
            keys,
            window,
            max_requests,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_settings(keys: ClientKeyHasher, settings: &Settings) -> Self {
        Self::new(
            keys,
            settings.rate_limit_window(),
            settings.rate_limit_max_requests,
        )
    }

    /// As [`RateLimit::check`], with an explicit clock.
    ///
    /// A refused request does not extend or refill the window.
    pub fn check_at(&self, client_addr: &str, now: Instant) -> Result<RateDecision> {
        let key = self.keys.key_for(client_addr)?;
        let mut windows = self.windows();

        let window = windows.entry(key).or_insert(Window {
            count: 0,
            reset_at: now + self.window,
        });
        if now >= window.reset_at {
            *window = Window {
                count: 0,
                reset_at: now + self.window,
            };
        }

        if window.count >= self.max_requests {
            let remaining = window.reset_at.saturating_duration_since(now);
            return Ok(RateDecision::Limited {
                retry_after_secs: ceil_secs(remaining).max(1),
            });
        }

        window.count += 1;
        Ok(RateDecision::Allowed {
            remaining: self.max_requests - window.count,
        })
    }

    /// Drop every expired window. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut windows = self.windows();
        let before = windows.len();
        windows.retain(|_, w| now < w.reset_at);
        before - windows.len()
    }

    /// Number of clients with a live or not-yet-swept window.
    pub fn tracked_clients(&self) -> usize {
        self.windows().len()
    }

    /// Sweep every `every` until `shutdown` flips.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        every: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        spawn_job("rate_limit_sweep", every, shutdown, move || {
            let removed = self.sweep();
            debug!(removed, "expired rate limit windows swept");
        })
    }

    fn windows(&self) -> MutexGuard<'_, HashMap<String, Window>> {
        self.windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RateLimit for RateLimiter {
    fn check(&self, client_addr: &str) -> Result<RateDecision> {
        self.check_at(client_addr, Instant::now())
    }
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> ClientKeyHasher {
        ClientKeyHasher::new(&HmacSecret::new(&"c".repeat(64)).unwrap()).unwrap()
    }

    fn limiter(max: u32) -> RateLimiter {
        RateLimiter::new(keys(), Duration::from_secs(900), max)
    }

    #[test]
    fn sixth_request_in_window_is_limited() {
        let rl = limiter(5);
        let t0 = Instant::now();

        for i in 0..5 {
            let decision = rl.check_at("203.0.113.7", t0 + Duration::from_secs(i)).unwrap();
            assert_eq!(decision, RateDecision::Allowed { remaining: 4 - i as u32 });
        }

        match rl.check_at("203.0.113.7", t0 + Duration::from_secs(10)).unwrap() {
            RateDecision::Limited { retry_after_secs } => assert_eq!(retry_after_secs, 890),
            other => panic!("expected Limited, got {other:?}"),
        }
    }

    #[test]
    fn new_window_starts_fresh_after_expiry() {
        let rl = limiter(5);
        let t0 = Instant::now();
        for _ in 0..6 {
            rl.check_at("203.0.113.7", t0).unwrap();
        }

        let later = t0 + Duration::from_secs(901);
        assert_eq!(
            rl.check_at("203.0.113.7", later).unwrap(),
            RateDecision::Allowed { remaining: 4 }
        );
    }

    #[test]
    fn retry_hint_is_at_least_one_second() {
        let rl = RateLimiter::new(keys(), Duration::from_millis(1500), 1);
        let t0 = Instant::now();
        rl.check_at("a", t0).unwrap();

        let near_end = t0 + Duration::from_millis(1499);
        assert_eq!(
            rl.check_at("a", near_end).unwrap(),
            RateDecision::Limited { retry_after_secs: 1 }
        );
        assert_eq!(
            rl.check_at("a", t0 + Duration::from_millis(200)).unwrap(),
            RateDecision::Limited { retry_after_secs: 2 }
        );
    }

    #[test]
    fn clients_are_counted_separately() {
        let rl = limiter(1);
        let t0 = Instant::now();
        assert!(rl.check_at("10.0.0.1", t0).unwrap().is_allowed());
        assert!(rl.check_at("10.0.0.2", t0).unwrap().is_allowed());
        assert!(!rl.check_at("10.0.0.1", t0).unwrap().is_allowed());
    }

    #[test]
    fn map_never_holds_raw_address() {
        let rl = limiter(5);
        rl.check("198.51.100.23").unwrap();

        let windows = rl.windows();
        let key = windows.keys().next().unwrap();
        assert_eq!(key.len(), CLIENT_KEY_LEN);
        assert!(!key.contains("198.51"));
        assert_eq!(*key, keys().key_for("198.51.100.23").unwrap());
    }

    #[test]
    fn sweep_drops_only_expired_windows() {
        let rl = RateLimiter::new(keys(), Duration::from_secs(60), 10);
        let t0 = Instant::now();
        rl.check_at("old", t0).unwrap();
        rl.check_at("new", t0 + Duration::from_secs(30)).unwrap();

        assert_eq!(rl.sweep_at(t0 + Duration::from_secs(61)), 1);
        assert_eq!(rl.tracked_clients(), 1);
    }

    #[test]
    fn client_keys_depend_on_secret() {
        let other = ClientKeyHasher::new(&HmacSecret::new(&"d".repeat(64)).unwrap()).unwrap();
        assert_ne!(keys().key_for("10.0.0.1").unwrap(), other.key_for("10.0.0.1").unwrap());
    }

    #[tokio::test]
    async fn sweeper_stops_on_shutdown() {
        let rl = Arc::new(RateLimiter::new(keys(), Duration::from_millis(5), 10));
        rl.check("10.0.0.1").unwrap();

        let (tx, rx) = watch::channel(false);
        let handle = Arc::clone(&rl).spawn_sweeper(Duration::from_millis(20), rx);

        for _ in 0..100 {
            if rl.tracked_clients() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(rl.tracked_clients(), 0);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn limiter_built_from_settings_sweeps_on_configured_cadence() {
        let settings = Settings {
            rate_limit_window_secs: 1,
            rate_limit_max_requests: 2,
            rate_limit_sweep_secs: 1,
            ..Settings::default()
        };
        settings.validate().unwrap();

        let rl = Arc::new(RateLimiter::from_settings(keys(), &settings));
        assert!(rl.check("10.0.0.1").unwrap().is_allowed());
        assert!(rl.check("10.0.0.1").unwrap().is_allowed());
        assert!(!rl.check("10.0.0.1").unwrap().is_allowed());

        let (tx, rx) = watch::channel(false);
        let handle = Arc::clone(&rl).spawn_sweeper(settings.rate_limit_sweep_interval(), rx);

        for _ in 0..50 {
            if rl.tracked_clients() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(rl.tracked_clients(), 0);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
