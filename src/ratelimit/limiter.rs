//! Core rate limiter implementation.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, trace};

use super::clock::{Clock, MonotonicClock};
use super::counter::{LimitResult, WindowState};
use super::quota::Quota;
use crate::config::RateLimitingConfig;
use crate::error::{Result, TollgateError};

/// Idle time after which a window may be evicted, unless a larger window
/// has been seen.
pub const DEFAULT_IDLE_THRESHOLD: Duration = Duration::from_secs(600);

/// The core rate limiter that owns the per-key counting windows.
///
/// Keys are spread over the shards of a [`DashMap`]. A check holds the write
/// lock of its key's shard for the whole read-modify-write, so concurrent
/// checks for one key are serialized while checks for keys in other shards
/// proceed independently. [`RateLimiter::sweep`] goes through the same shard
/// locks.
pub struct RateLimiter<C: Clock = MonotonicClock> {
    /// Counting windows indexed by caller key
    windows: DashMap<String, WindowState>,
    /// Monotonic time source
    clock: C,
    /// Minimum age before an entry is evictable
    idle_threshold: Duration,
    /// Largest `window_seconds` passed to any check so far
    largest_window_secs: AtomicU64,
}

impl RateLimiter<MonotonicClock> {
    /// Create a new rate limiter with default settings.
    pub fn new() -> Self {
        Self::with_clock(MonotonicClock::new())
    }

    /// Create a rate limiter from the service configuration.
    pub fn from_config(config: &RateLimitingConfig) -> Result<Self> {
        Self::with_options(
            MonotonicClock::new(),
            Duration::from_secs(config.idle_eviction_secs),
            config.shard_amount,
        )
    }
}

impl Default for RateLimiter<MonotonicClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> RateLimiter<C> {
    /// Create a rate limiter on the given clock with default settings.
    pub fn with_clock(clock: C) -> Self {
        Self {
            windows: DashMap::new(),
            clock,
            idle_threshold: DEFAULT_IDLE_THRESHOLD,
            largest_window_secs: AtomicU64::new(0),
        }
    }

    /// Create a rate limiter with an explicit idle threshold and shard count.
    ///
    /// `shard_amount` must be a power of two greater than one; `None` lets
    /// the map pick one from the number of CPUs.
    pub fn with_options(
        clock: C,
        idle_threshold: Duration,
        shard_amount: Option<usize>,
    ) -> Result<Self> {
        if idle_threshold.is_zero() {
            return Err(TollgateError::InvalidConfiguration(
                "idle eviction threshold must be positive".to_string(),
            ));
        }

        let windows = match shard_amount {
            None => DashMap::new(),
            Some(n) if n > 1 && n.is_power_of_two() => DashMap::with_shard_amount(n),
            Some(n) => {
                return Err(TollgateError::InvalidConfiguration(format!(
                    "shard amount must be a power of two greater than one, got {}",
                    n
                )))
            }
        };

        Ok(Self {
            windows,
            clock,
            idle_threshold,
            largest_window_secs: AtomicU64::new(0),
        })
    }

    /// Check the rate limit for `key` under `max_requests` per
    /// `window_seconds`.
    ///
    /// Fails with `InvalidConfiguration` on an empty key or a non-positive
    /// quota. Being over quota is reported as `allowed == false`.
    pub fn check_limit(
        &self,
        key: &str,
        max_requests: u64,
        window_seconds: u64,
    ) -> Result<LimitResult> {
        let quota = Quota::new(max_requests, window_seconds)?;
        self.check(key, &quota)
    }

    /// Check the rate limit for `key` under an already validated quota.
    pub fn check(&self, key: &str, quota: &Quota) -> Result<LimitResult> {
        if key.is_empty() {
            return Err(TollgateError::InvalidConfiguration(
                "rate limit key must not be empty".to_string(),
            ));
        }

        self.largest_window_secs
            .fetch_max(quota.window_seconds(), Ordering::Relaxed);

        let now = self.clock.now();

        trace!(key = %key, quota = %quota, "Checking rate limit");

        // Existing keys avoid allocating an owned key.
        let existing = self
            .windows
            .get_mut(key)
            .map(|mut state| state.record(now, quota));

        let result = match existing {
            Some(result) => result,
            None => match self.windows.entry(key.to_owned()) {
                Entry::Occupied(mut occupied) => occupied.get_mut().record(now, quota),
                Entry::Vacant(vacant) => {
                    debug!(key = %key, quota = %quota, "Opening rate limit window");
                    vacant.insert(WindowState::open(now));
                    WindowState::opened_result(quota)
                }
            },
        };

        if !result.allowed {
            debug!(
                key = %key,
                reset_in = result.reset_in,
                "Rate limit exceeded"
            );
        }

        Ok(result)
    }

    /// Evict windows idle for at least [`eviction_threshold`](Self::eviction_threshold).
    ///
    /// Returns the number of evicted entries.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let threshold = self.eviction_threshold();
        let mut evicted = 0;

        self.windows.retain(|_, state| {
            let keep = state.age(now) < threshold;
            if !keep {
                evicted += 1;
            }
            keep
        });

        if evicted > 0 {
            debug!(
                evicted = evicted,
                remaining = self.windows.len(),
                threshold_secs = threshold.as_secs(),
                "Evicted idle rate limit windows"
            );
        }

        evicted
    }

    /// Age at which a window becomes evictable: the idle threshold, or twice
    /// the largest window seen, whichever is larger.
    pub fn eviction_threshold(&self) -> Duration {
        let largest = self.largest_window_secs.load(Ordering::Relaxed);
        let doubled = Duration::from_secs(largest.saturating_mul(2));
        self.idle_threshold.max(doubled)
    }

    /// Requests counted in the stored window for `key`, if one exists.
    ///
    /// The stored window may already be expired; it is reset on the next
    /// check.
    pub fn count_for(&self, key: &str) -> Option<u64> {
        self.windows.get(key).map(|state| state.count())
    }

    /// Number of stored windows.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Whether no windows are stored.
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Drop every stored window.
    pub fn clear(&self) {
        self.windows.clear();
    }

    /// The clock this limiter reads.
    pub fn clock(&self) -> &C {
        &self.clock
    }
}
