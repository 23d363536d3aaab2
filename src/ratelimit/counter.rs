//! Fixed-window counter state for a single caller key.

use serde::Serialize;
use std::time::Duration;

use super::quota::Quota;

/// Outcome of a single rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitResult {
    /// Whether the request is admitted
    pub allowed: bool,
    /// Requests left in the current window
    pub remaining: u64,
    /// Whole seconds until the current window resets
    pub reset_in: u64,
}

/// Counting window for one key.
///
/// `window_start` is a reading of the limiter's monotonic clock. Once
/// `now - window_start >= window_seconds` the window is expired and behaves
/// as if it did not exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowState {
    /// When the current window started
    window_start: Duration,
    /// Requests admitted since `window_start`
    count: u64,
}

impl WindowState {
    /// Open a fresh window at `now` holding the request that opened it.
    pub fn open(now: Duration) -> Self {
        Self {
            window_start: now,
            count: 1,
        }
    }

    /// Result reported for the request that opened a window.
    pub fn opened_result(quota: &Quota) -> LimitResult {
        LimitResult {
            allowed: true,
            remaining: quota.max_requests() - 1,
            reset_in: quota.window_seconds(),
        }
    }

    /// Record one request against this window.
    ///
    /// Expired windows are reset in place. A denied request leaves the count
    /// untouched.
    pub fn record(&mut self, now: Duration, quota: &Quota) -> LimitResult {
        if self.is_expired(now, quota.window()) {
            *self = Self::open(now);
            return Self::opened_result(quota);
        }

        let reset_in = self.reset_in(now, quota.window());

        if self.count < quota.max_requests() {
            self.count += 1;
            LimitResult {
                allowed: true,
                remaining: quota.max_requests() - self.count,
                reset_in,
            }
        } else {
            LimitResult {
                allowed: false,
                remaining: 0,
                reset_in,
            }
        }
    }

    /// Whether the window has run its full length.
    pub fn is_expired(&self, now: Duration, window: Duration) -> bool {
        self.age(now) >= window
    }

    /// Time elapsed since the window opened.
    pub fn age(&self, now: Duration) -> Duration {
        now.saturating_sub(self.window_start)
    }

    /// Seconds until the window resets, rounded up.
    pub fn reset_in(&self, now: Duration, window: Duration) -> u64 {
        ceil_secs(window.saturating_sub(self.age(now)))
    }

    /// Requests admitted in this window.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Monotonic timestamp the window opened at.
    pub fn window_start(&self) -> Duration {
        self.window_start
    }
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quota(max: u64, window: u64) -> Quota {
        Quota::new(max, window).unwrap()
    }

    #[test]
    fn test_open_window_counts_first_request() {
        let state = WindowState::open(Duration::from_secs(3));
        assert_eq!(state.count(), 1);
        assert_eq!(state.window_start(), Duration::from_secs(3));

        let result = WindowState::opened_result(&quota(5, 60));
        assert_eq!(
            result,
            LimitResult {
                allowed: true,
                remaining: 4,
                reset_in: 60
            }
        );
    }

    #[test]
    fn test_record_within_limit() {
        let q = quota(3, 10);
        let mut state = WindowState::open(Duration::ZERO);

        let result = state.record(Duration::from_secs(2), &q);
        assert!(result.allowed);
        assert_eq!(result.remaining, 1);
        assert_eq!(result.reset_in, 8);
        assert_eq!(state.count(), 2);
    }

    #[test]
    fn test_record_denial_does_not_increment() {
        let q = quota(2, 10);
        let mut state = WindowState::open(Duration::ZERO);
        state.record(Duration::ZERO, &q);

        let denied = state.record(Duration::from_secs(1), &q);
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert_eq!(state.count(), 2);

        state.record(Duration::from_secs(2), &q);
        assert_eq!(state.count(), 2);
    }

    #[test]
    fn test_record_resets_expired_window() {
        let q = quota(1, 5);
        let mut state = WindowState::open(Duration::ZERO);

        let result = state.record(Duration::from_secs(5), &q);
        assert!(result.allowed);
        assert_eq!(result.remaining, 0);
        assert_eq!(result.reset_in, 5);
        assert_eq!(state.window_start(), Duration::from_secs(5));
        assert_eq!(state.count(), 1);
    }

    #[test]
    fn test_reset_in_rounds_up() {
        let state = WindowState::open(Duration::ZERO);
        let window = Duration::from_secs(60);

        assert_eq!(state.reset_in(Duration::ZERO, window), 60);
        assert_eq!(state.reset_in(Duration::from_millis(100), window), 60);
        assert_eq!(state.reset_in(Duration::from_millis(59_001), window), 1);
        assert_eq!(state.reset_in(Duration::from_secs(61), window), 0);
    }

    #[test]
    fn test_limit_result_serializes_camel_case() {
        let result = LimitResult {
            allowed: false,
            remaining: 0,
            reset_in: 12,
        };
        let json = serde_json::to_value(result).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"allowed": false, "remaining": 0, "resetIn": 12})
        );
    }
}
