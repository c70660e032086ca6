//! Concurrent counter storage with idle eviction.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::counter::KeyCounter;
use super::key::LimitKey;

/// Map of rate limit counters that forgets idle keys.
///
/// Every operation on a key, including the sweep, goes through the same
/// shard lock, so a counter is never observed half-updated and a sweep never
/// removes a counter while an admission decision is being made on it.
#[derive(Debug, Default)]
pub struct ExpiringStore {
    counters: DashMap<LimitKey, KeyCounter>,
}

impl ExpiringStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            counters: DashMap::new(),
        }
    }

    /// Get the counter for `key`, creating a zeroed one at `now` if absent.
    ///
    /// The returned guard holds the key's shard lock; drop it promptly.
    pub fn get_or_create(
        &self,
        key: &LimitKey,
        now: Instant,
    ) -> RefMut<'_, LimitKey, KeyCounter> {
        if let Some(counter) = self.counters.get_mut(key) {
            return counter;
        }

        self.counters.entry(key.clone()).or_insert_with(|| {
            debug!(key = %key, "Creating new rate limit counter");
            KeyCounter::new(now)
        })
    }

    /// Snapshot of the counter for `key`.
    pub fn get(&self, key: &LimitKey) -> Option<KeyCounter> {
        self.counters.get(key).map(|counter| *counter.value())
    }

    /// Remove every counter idle for at least `idle_ttl` as of `now`.
    ///
    /// Returns the number of counters removed.
    pub fn sweep(&self, now: Instant, idle_ttl: Duration) -> usize {
        let before = self.counters.len();
        self.counters.retain(|_, counter| !counter.is_idle(now, idle_ttl));
        before.saturating_sub(self.counters.len())
    }

    /// Drop the counter for `key` so the next request starts a fresh window.
    ///
    /// Returns `true` if a counter existed.
    pub fn reset(&self, key: &LimitKey) -> bool {
        self.counters.remove(key).is_some()
    }

    /// Clear all counters.
    pub fn clear(&self) {
        self.counters.clear();
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// Whether no keys are tracked.
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Start a background task that sweeps idle counters every `interval`.
    ///
    /// Must be called from within a tokio runtime. The task stops when the
    /// returned [`Sweeper`] is shut down or dropped.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        clock: Arc<dyn Clock>,
        interval: Duration,
        idle_ttl: Duration,
    ) -> Sweeper {
        assert!(!interval.is_zero(), "sweep interval must be non-zero");

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_ms = interval.as_millis() as u64,
            idle_ttl_ms = idle_ttl.as_millis() as u64,
            "Starting idle counter sweeper"
        );

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = self.sweep(clock.now(), idle_ttl);
                        if removed > 0 {
                            debug!(
                                removed = removed,
                                remaining = self.len(),
                                "Evicted idle rate limit counters"
                            );
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            debug!("Idle counter sweeper stopped");
        });

        Sweeper {
            shutdown_tx,
            handle,
        }
    }
}

/// Handle to a running sweep task.
#[derive(Debug)]
pub struct Sweeper {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Sweeper {
    /// Signal the task to stop and wait for it to exit.
    pub async fn shutdown(self) {
        // A send error means the task already exited.
        let _ = self.shutdown_tx.send(true);

        if let Err(e) = self.handle.await {
            warn!(error = %e, "Idle counter sweeper terminated abnormally");
        }
    }

    /// Whether the task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;

    const WINDOW: Duration = Duration::from_secs(1);

    #[test]
    fn test_get_or_create_creates_once() {
        let store = ExpiringStore::new();
        let key = LimitKey::route("/api1");
        let now = Instant::now();

        store.get_or_create(&key, now).try_acquire(now, 10, WINDOW);
        store.get_or_create(&key, now).try_acquire(now, 10, WINDOW);

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&key).map(|c| c.count()), Some(2));
    }

    #[test]
    fn test_concurrent_first_calls_share_one_counter() {
        let store = ExpiringStore::new();
        let key = LimitKey::route("/new");
        let now = Instant::now();
        let barrier = std::sync::Barrier::new(16);

        std::thread::scope(|s| {
            for _ in 0..16 {
                s.spawn(|| {
                    barrier.wait();
                    store.get_or_create(&key, now).try_acquire(now, 100, WINDOW);
                });
            }
        });

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&key).map(|c| c.count()), Some(16));
    }

    #[test]
    fn test_sweep_removes_only_idle_counters() {
        let store = ExpiringStore::new();
        let start = Instant::now();
        let ttl = Duration::from_secs(5);

        let stale = LimitKey::route("/stale");
        let fresh = LimitKey::route("/fresh");
        store.get_or_create(&stale, start).try_acquire(start, 10, WINDOW);

        let later = start + Duration::from_secs(3);
        store.get_or_create(&fresh, later).try_acquire(later, 10, WINDOW);

        assert_eq!(store.sweep(start + ttl, ttl), 1);
        assert!(store.get(&stale).is_none());
        assert!(store.get(&fresh).is_some());
    }

    #[test]
    fn test_reset_removes_counter() {
        let store = ExpiringStore::new();
        let key = LimitKey::route("/api2");
        let now = Instant::now();
        store.get_or_create(&key, now);

        assert!(store.reset(&key));
        assert!(!store.reset(&key));
        assert!(store.is_empty());
    }

    #[test]
    fn test_clear() {
        let store = ExpiringStore::new();
        let now = Instant::now();
        store.get_or_create(&LimitKey::route("/a"), now);
        store.get_or_create(&LimitKey::route("/b"), now);

        store.clear();
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_sweeper_evicts_in_background() {
        let store = Arc::new(ExpiringStore::new());
        let clock = Arc::new(ManualClock::new());
        let ttl = Duration::from_secs(1);
        let key = LimitKey::route("/api1");

        store.get_or_create(&key, clock.now());

        let sweeper = Arc::clone(&store).spawn_sweeper(
            clock.clone(),
            Duration::from_millis(10),
            ttl,
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.len(), 1, "counter is not idle yet");

        clock.advance(ttl);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.is_empty());

        sweeper.shutdown().await;
    }

    #[tokio::test]
    async fn test_sweeper_shutdown_stops_task() {
        let store = Arc::new(ExpiringStore::new());
        let clock = Arc::new(ManualClock::new());

        let sweeper = Arc::clone(&store).spawn_sweeper(
            clock,
            Duration::from_millis(10),
            Duration::from_secs(1),
        );
        assert!(!sweeper.is_finished());

        sweeper.shutdown().await;
        // Only the test's handle remains once the task has exited.
        assert_eq!(Arc::strong_count(&store), 1);
    }

    #[tokio::test]
    async fn test_dropping_sweeper_stops_task() {
        let store = Arc::new(ExpiringStore::new());
        let clock = Arc::new(ManualClock::new());

        let sweeper = Arc::clone(&store).spawn_sweeper(
            clock,
            Duration::from_millis(10),
            Duration::from_secs(1),
        );
        drop(sweeper);

        for _ in 0..50 {
            if Arc::strong_count(&store) == 1 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("sweeper task kept running after its handle was dropped");
    }

    #[tokio::test]
    #[should_panic(expected = "sweep interval must be non-zero")]
    async fn test_zero_sweep_interval_is_rejected_before_spawning() {
        let store = Arc::new(ExpiringStore::new());
        let clock = Arc::new(ManualClock::new());

        let _sweeper = store.spawn_sweeper(clock, Duration::ZERO, Duration::from_secs(1));
    }
}
