//! Per-key fixed-window counter.

use std::time::{Duration, Instant};

/// Request count for one key within the current window.
///
/// A counter carries no synchronization of its own: the store hands it out
/// behind a per-shard write guard, so every method here runs with exclusive
/// access to the counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyCounter {
    /// Admitted requests in the current window
    count: u64,
    /// When the current window began
    window_start: Instant,
    /// Most recent admission attempt for this key
    last_seen: Instant,
}

impl KeyCounter {
    /// Create a zeroed counter whose window starts at `now`.
    pub fn new(now: Instant) -> Self {
        Self {
            count: 0,
            window_start: now,
            last_seen: now,
        }
    }

    /// Record an admission attempt at `now` and decide it.
    ///
    /// Returns `true` if the request is within the limit. Rejected requests
    /// do not consume budget.
    pub fn try_acquire(&mut self, now: Instant, limit: u64, window: Duration) -> bool {
        self.last_seen = now;
        self.maybe_reset_window(now, window);

        assert!(
            self.count <= limit,
            "counter exceeded its limit: count={} limit={}",
            self.count,
            limit
        );

        if self.count >= limit {
            return false;
        }

        self.count += 1;
        true
    }

    /// Admitted requests in the current window.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// When the current window began.
    pub fn window_start(&self) -> Instant {
        self.window_start
    }

    /// Most recent admission attempt.
    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }

    /// Remaining quota under `limit`.
    pub fn remaining(&self, limit: u64) -> u64 {
        limit.saturating_sub(self.count)
    }

    /// Time from `now` until the current window ends.
    pub fn duration_until_reset(&self, now: Instant, window: Duration) -> Duration {
        let elapsed = now.saturating_duration_since(self.window_start);
        window.saturating_sub(elapsed)
    }

    /// Whether the counter has seen no traffic for at least `idle_ttl`.
    pub fn is_idle(&self, now: Instant, idle_ttl: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) >= idle_ttl
    }

    /// Start a new window if the current one has expired.
    fn maybe_reset_window(&mut self, now: Instant, window: Duration) {
        if now.saturating_duration_since(self.window_start) >= window {
            self.count = 0;
            self.window_start = now;
        }
    }
}
