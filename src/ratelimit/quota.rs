//! Quota definition.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, TollgateError};

/// Requests allowed per window when nothing else is configured.
pub const DEFAULT_MAX_REQUESTS: u64 = 100;
/// Window length in seconds when nothing else is configured.
pub const DEFAULT_WINDOW_SECONDS: u64 = 60;

/// An immutable `max_requests` per `window_seconds` pair.
///
/// Both values are guaranteed positive; construction through [`Quota::new`]
/// or deserialization rejects zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "QuotaFields", into = "QuotaFields")]
pub struct Quota {
    max_requests: u64,
    window_seconds: u64,
}

#[derive(Serialize, Deserialize)]
struct QuotaFields {
    max_requests: u64,
    window_seconds: u64,
}

impl Quota {
    /// Create a quota, failing with `InvalidConfiguration` on zero values.
    pub fn new(max_requests: u64, window_seconds: u64) -> Result<Self> {
        if max_requests == 0 {
            return Err(TollgateError::InvalidConfiguration(
                "max_requests must be positive".to_string(),
            ));
        }
        if window_seconds == 0 {
            return Err(TollgateError::InvalidConfiguration(
                "window_seconds must be positive".to_string(),
            ));
        }
        Ok(Self {
            max_requests,
            window_seconds,
        })
    }

    /// Maximum requests admitted per window.
    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    /// Window length in whole seconds.
    pub fn window_seconds(&self) -> u64 {
        self.window_seconds
    }

    /// Window length as a duration.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

impl Default for Quota {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            window_seconds: DEFAULT_WINDOW_SECONDS,
        }
    }
}

impl std::fmt::Display for Quota {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}s", self.max_requests, self.window_seconds)
    }
}

impl TryFrom<QuotaFields> for Quota {
    type Error = TollgateError;

    fn try_from(fields: QuotaFields) -> Result<Self> {
        Quota::new(fields.max_requests, fields.window_seconds)
    }
}

impl From<Quota> for QuotaFields {
    fn from(quota: Quota) -> Self {
        Self {
            max_requests: quota.max_requests,
            window_seconds: quota.window_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_defaults() {
        let quota = Quota::default();
        assert_eq!(quota.max_requests(), 100);
        assert_eq!(quota.window_seconds(), 60);
        assert_eq!(quota.window(), Duration::from_secs(60));
    }

    #[test]
    fn test_quota_rejects_zero_values() {
        assert!(matches!(
            Quota::new(0, 60),
            Err(TollgateError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            Quota::new(10, 0),
            Err(TollgateError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_quota_deserialize_validates() {
        let quota: Quota = serde_yaml::from_str("max_requests: 5\nwindow_seconds: 1\n").unwrap();
        assert_eq!(quota, Quota::new(5, 1).unwrap());

        let err = serde_yaml::from_str::<Quota>("max_requests: 0\nwindow_seconds: 1\n");
        assert!(err.is_err());
    }

    #[test]
    fn test_quota_display() {
        assert_eq!(Quota::new(5, 60).unwrap().to_string(), "5/60s");
    }
}
