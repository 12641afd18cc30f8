//! # Rate Limiting
//!
//! One [`GlobalRateLimiter`] is shared by the controllers of every kind. It
//! combines per-key exponential backoff for failing resources with a global
//! token bucket that bounds the rate of reconciliation passes.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

/// Backoff and token bucket settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimiterConfig {
    /// Delay after the first failure
    pub base_delay: Duration,
    /// Upper bound for any backoff delay
    pub max_delay: Duration,
    /// Passes admitted per second once the burst is spent
    pub rate_per_sec: f64,
    /// Passes admitted back to back
    pub burst: f64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(crate::constants::DEFAULT_BACKOFF_BASE_MS),
            max_delay: Duration::from_secs(crate::constants::DEFAULT_BACKOFF_MAX_SECS),
            rate_per_sec: f64::from(crate::constants::DEFAULT_GLOBAL_RATE_PER_SEC),
            burst: f64::from(crate::constants::DEFAULT_GLOBAL_RATE_BURST),
        }
    }
}

impl From<&crate::config::ControllerConfig> for RateLimiterConfig {
    fn from(config: &crate::config::ControllerConfig) -> Self {
        Self {
            base_delay: config.backoff_base,
            max_delay: config.backoff_max,
            rate_per_sec: f64::from(config.global_rate_per_sec),
            burst: f64::from(config.global_rate_burst),
        }
    }
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

/// Per-key exponential backoff plus a global token bucket
#[derive(Debug)]
pub struct GlobalRateLimiter {
    config: RateLimiterConfig,
    failures: Mutex<HashMap<String, u32>>,
    bucket: Mutex<TokenBucket>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl GlobalRateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            bucket: Mutex::new(TokenBucket {
                tokens: config.burst,
                last_refill: Instant::now(),
            }),
            config,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Limiter key shared across kinds
    pub fn key(kind: &str, name: &str) -> String {
        format!("{kind}/{name}")
    }

    /// Un-jittered delay after `failures` consecutive failures: `min(base * 2^(n-1), max)`
    pub fn backoff_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        let factor = 2u32.pow(exponent);
        self.config
            .base_delay
            .checked_mul(factor)
            .map_or(self.config.max_delay, |d| d.min(self.config.max_delay))
    }

    /// Record a failure for `key` and return the jittered delay before the next attempt
    pub fn next_backoff(&self, key: &str) -> Duration {
        let failures = {
            let mut map = lock(&self.failures);
            let count = map.entry(key.to_string()).or_insert(0);
            *count = count.saturating_add(1);
            *count
        };
        let delay = self.backoff_for(failures);
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        Duration::from_secs_f64(delay.as_secs_f64() * jitter).min(self.config.max_delay)
    }

    /// Consecutive failures recorded for `key`
    pub fn failures(&self, key: &str) -> u32 {
        lock(&self.failures).get(key).copied().unwrap_or(0)
    }

    /// Reset backoff for `key` after a success or once the resource is gone
    pub fn forget(&self, key: &str) {
        lock(&self.failures).remove(key);
    }

    /// Take a token for one reconciliation pass
    ///
    /// Returns `None` when the pass may proceed, or the delay until a token is available.
    pub fn admit(&self) -> Option<Duration> {
        if self.config.rate_per_sec <= 0.0 {
            return None;
        }
        let mut bucket = lock(&self.bucket);
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.config.rate_per_sec).min(self.config.burst);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            None
        } else {
            let missing = 1.0 - bucket.tokens;
            Some(Duration::from_secs_f64(missing / self.config.rate_per_sec))
        }
    }
}

impl Default for GlobalRateLimiter {
    fn default() -> Self {
        Self::new(RateLimiterConfig::default())
    }
}
