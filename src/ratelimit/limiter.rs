//! Core rate limiter implementation.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::counter::KeyCounter;
use super::key::LimitKey;
use super::store::{ExpiringStore, Sweeper};

/// Default number of requests admitted per window.
pub const DEFAULT_LIMIT: u64 = 10;
/// Default window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(1);
/// Default inactivity period after which a counter is forgotten.
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(1);

/// Parameters of a fixed-window limiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimiterConfig {
    /// Maximum admitted requests per window
    pub limit: u64,
    /// Window length
    pub window: Duration,
    /// Inactivity after which a key's counter is purged
    pub idle_ttl: Duration,
    /// How often the background sweep runs
    pub sweep_interval: Duration,
}

impl LimiterConfig {
    /// Config with the given limit and window; idle TTL and sweep follow the window.
    pub fn new(limit: u64, window: Duration) -> Self {
        Self {
            limit,
            window,
            idle_ttl: window,
            sweep_interval: window,
        }
    }

    /// Set the idle TTL, and the sweep interval with it.
    pub fn with_idle_ttl(mut self, idle_ttl: Duration) -> Self {
        self.idle_ttl = idle_ttl;
        self.sweep_interval = idle_ttl;
        self
    }

    /// Set the sweep interval.
    pub fn with_sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval;
        self
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self::new(DEFAULT_LIMIT, DEFAULT_WINDOW).with_idle_ttl(DEFAULT_IDLE_TTL)
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request was admitted
    pub allowed: bool,
    /// Configured limit
    pub limit: u64,
    /// Requests still admissible in the current window
    pub remaining: u64,
    /// Time until the current window ends
    pub reset_after: Duration,
}

/// Fixed-window admission control over a set of keys.
///
/// This struct is thread-safe and can be shared across multiple tasks.
#[derive(Debug)]
pub struct RateLimiter {
    config: LimiterConfig,
    store: Arc<ExpiringStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a rate limiter reading the system clock.
    pub fn new(config: LimiterConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a rate limiter with an injected clock.
    ///
    /// # Panics
    ///
    /// Panics if the limit, window, idle TTL or sweep interval is zero.
    pub fn with_clock(config: LimiterConfig, clock: Arc<dyn Clock>) -> Self {
        assert!(config.limit > 0, "rate limit must be greater than zero");
        assert!(!config.window.is_zero(), "rate limit window must be non-zero");
        assert!(!config.idle_ttl.is_zero(), "idle TTL must be non-zero");
        assert!(
            !config.sweep_interval.is_zero(),
            "sweep interval must be non-zero"
        );

        Self {
            config,
            store: Arc::new(ExpiringStore::new()),
            clock,
        }
    }

    /// Decide whether a request for `key` is admitted.
    ///
    /// Never blocks on I/O; the only lock taken is the key's shard lock, held
    /// for the duration of one read-modify-write.
    pub fn check(&self, key: &LimitKey) -> Decision {
        let now = self.clock.now();
        let LimiterConfig { limit, window, .. } = self.config;

        let (allowed, counter) = {
            let mut counter = self.store.get_or_create(key, now);
            let allowed = counter.try_acquire(now, limit, window);
            (allowed, *counter)
        };

        trace!(
            key = %key,
            count = counter.count(),
            allowed = allowed,
            "Checked rate limit"
        );

        if !allowed {
            debug!(key = %key, limit = limit, "Rate limit exceeded");
        }

        Decision {
            allowed,
            limit,
            remaining: counter.remaining(limit),
            reset_after: counter.duration_until_reset(now, window),
        }
    }

    /// Returns `true` if a request for `key` is admitted.
    pub fn allow(&self, key: &LimitKey) -> bool {
        self.check(key).allowed
    }

    /// Forget `key`'s counter so its next request starts a fresh window.
    pub fn reset(&self, key: &LimitKey) -> bool {
        self.store.reset(key)
    }

    /// Snapshot of the counter for `key`.
    ///
    /// Returns `None` if no counter exists for the key.
    pub fn counter(&self, key: &LimitKey) -> Option<KeyCounter> {
        self.store.get(key)
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.store.len()
    }

    /// Evict idle counters now. Returns the number removed.
    pub fn sweep(&self) -> usize {
        self.store.sweep(self.clock.now(), self.config.idle_ttl)
    }

    /// Start the background sweep on the configured interval.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_sweeper(&self) -> Sweeper {
        Arc::clone(&self.store).spawn_sweeper(
            Arc::clone(&self.clock),
            self.config.sweep_interval,
            self.config.idle_ttl,
        )
    }

    /// The limiter's configuration.
    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(LimiterConfig::default())
    }
}
