//! Background eviction of idle rate limit windows.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::limiter::RateLimiter;
use crate::error::{Result, TollgateError};

/// Handle to a running sweep task.
///
/// The task calls [`RateLimiter::sweep`] once per interval until
/// [`Sweeper::shutdown`] is called or the handle is dropped.
pub struct Sweeper {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Sweeper {
    /// Spawn the sweep task on the current tokio runtime.
    pub fn start<C: Clock + 'static>(
        limiter: Arc<RateLimiter<C>>,
        interval: Duration,
    ) -> Result<Self> {
        if interval.is_zero() {
            return Err(TollgateError::InvalidConfiguration(
                "sweep interval must be positive".to_string(),
            ));
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        info!(
            interval_secs = interval.as_secs_f64(),
            "Starting rate limit sweeper"
        );

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = limiter.sweep();
                        debug!(evicted = evicted, tracked = limiter.len(), "Sweep finished");
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            debug!("Rate limit sweeper stopped");
        });

        Ok(Self {
            shutdown_tx,
            handle,
        })
    }

    /// Stop the sweep task and wait for it to finish.
    pub async fn shutdown(self) {
        info!("Shutting down rate limit sweeper");
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Rate limit sweeper task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let limiter = Arc::new(RateLimiter::new());
        assert!(Sweeper::start(limiter, Duration::ZERO).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_idle_windows() {
        let clock = ManualClock::new();
        let limiter = Arc::new(
            RateLimiter::with_options(clock.clone(), Duration::from_secs(10), None).unwrap(),
        );
        limiter.check_limit("idle", 1, 1).unwrap();

        let sweeper = Sweeper::start(Arc::clone(&limiter), Duration::from_secs(1)).unwrap();

        clock.advance(Duration::from_secs(10));
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert!(limiter.is_empty());
        sweeper.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_keeps_live_windows() {
        let clock = ManualClock::new();
        let limiter = Arc::new(
            RateLimiter::with_options(clock.clone(), Duration::from_secs(10), None).unwrap(),
        );
        limiter.check_limit("live", 5, 60).unwrap();

        let sweeper = Sweeper::start(Arc::clone(&limiter), Duration::from_secs(1)).unwrap();

        clock.advance(Duration::from_secs(30));
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(limiter.count_for("live"), Some(1));
        sweeper.shutdown().await;
    }
}
