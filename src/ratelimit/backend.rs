//! Rate limiter trait for abstracting the store behind the HTTP layer.

use super::clock::Clock;
use super::counter::LimitResult;
use super::limiter::RateLimiter;
use super::quota::Quota;
use crate::error::Result;

/// Trait for rate limiter implementations.
///
/// The HTTP middleware is generic over this trait so that it can be driven
/// by a limiter on any clock, or by a test double.
pub trait RateLimiterBackend: Send + Sync {
    /// Check the rate limit for a caller key under the given quota.
    fn check(&self, key: &str, quota: &Quota) -> Result<LimitResult>;
}

impl<C: Clock> RateLimiterBackend for RateLimiter<C> {
    fn check(&self, key: &str, quota: &Quota) -> Result<LimitResult> {
        RateLimiter::check(self, key, quota)
    }
}
