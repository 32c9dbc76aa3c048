//! Condition polling.
//!
//! Every readiness gate in a node's startup goes through [`Poller`]: the
//! container reaching its running state, the SSH daemon answering, and any
//! caller-defined wait.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::error::{ClusterError, Result};

/// Default pause between attempts.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Repeatedly evaluates a condition until it holds or a deadline passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Poller {
    condition: String,
    timeout: Duration,
    interval: Duration,
    time_to_success: Duration,
}

impl Poller {
    /// Create a poller for `condition` (used in logs and errors) that gives
    /// up after `timeout`.
    pub fn new(condition: impl Into<String>, timeout: Duration) -> Self {
        Self {
            condition: condition.into(),
            timeout,
            interval: DEFAULT_POLL_INTERVAL,
            time_to_success: Duration::ZERO,
        }
    }

    /// Set the pause between attempts. Zero is raised to one millisecond.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    /// Require the condition to keep holding for `duration` before the wait
    /// counts as a success. A false result in between restarts the clock.
    #[must_use]
    pub fn with_time_to_success(mut self, duration: Duration) -> Self {
        self.time_to_success = duration;
        self
    }

    /// Description of the awaited condition.
    #[must_use]
    pub fn condition(&self) -> &str {
        &self.condition
    }

    /// Deadline for the wait.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Pause between attempts.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait for `check` to return `true`, logging the outcome.
    ///
    /// Returns the time it took. Errors from `check` abort the wait.
    pub async fn wait_for<F, Fut>(&self, check: F) -> Result<Duration>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        let condition = self.condition.as_str();
        self.wait_for_with(
            check,
            |elapsed| debug!(condition, elapsed_secs = elapsed.as_secs_f64(), "condition met"),
            |timeout| debug!(condition, timeout_secs = timeout.as_secs_f64(), "timed out waiting for condition"),
        )
        .await
    }

    /// Wait for `check` to return `true`.
    ///
    /// On success `on_success` receives the elapsed time; on timeout
    /// `on_failure` receives the timeout and [`ClusterError::Timeout`] is
    /// returned. The condition is always evaluated at least once.
    pub async fn wait_for_with<F, Fut, S, E>(
        &self,
        mut check: F,
        on_success: S,
        on_failure: E,
    ) -> Result<Duration>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool>>,
        S: FnOnce(Duration),
        E: FnOnce(Duration),
    {
        let start = Instant::now();
        let deadline = start + self.timeout;
        let mut holding_since: Option<Instant> = None;

        loop {
            if check().await? {
                let since = *holding_since.get_or_insert_with(Instant::now);
                if since.elapsed() >= self.time_to_success {
                    let elapsed = start.elapsed();
                    on_success(elapsed);
                    return Ok(elapsed);
                }
            } else {
                holding_since = None;
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            // The last attempt lands on the deadline.
            tokio::time::sleep(self.interval.min(deadline - now)).await;
        }

        on_failure(self.timeout);
        Err(ClusterError::Timeout {
            condition: self.condition.clone(),
            timeout: self.timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]

    use std::cell::Cell;

    use super::*;

    #[test]
    fn test_interval_is_clamped() {
        let poller = Poller::new("x", Duration::from_secs(1)).with_interval(Duration::ZERO);
        assert_eq!(poller.interval(), MIN_POLL_INTERVAL);
        assert_eq!(
            Poller::new("x", Duration::from_secs(1)).interval(),
            DEFAULT_POLL_INTERVAL
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_third_attempt() {
        let attempts = Cell::new(0);
        let succeeded = Cell::new(None);
        let failed = Cell::new(false);

        let elapsed = Poller::new("third attempt", Duration::from_secs(30))
            .wait_for_with(
                || {
                    attempts.set(attempts.get() + 1);
                    let done = attempts.get() == 3;
                    async move { Ok(done) }
                },
                |elapsed| succeeded.set(Some(elapsed)),
                |_| failed.set(true),
            )
            .await
            .unwrap();

        assert_eq!(attempts.get(), 3);
        assert_eq!(elapsed, Duration::from_secs(2));
        assert_eq!(succeeded.get(), Some(Duration::from_secs(2)));
        assert!(!failed.get());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_calls_failure_hook() {
        let attempts = Cell::new(0u32);
        let failure = Cell::new(None);

        let err = Poller::new("never", Duration::from_secs(3))
            .wait_for_with(
                || {
                    attempts.set(attempts.get() + 1);
                    async { Ok(false) }
                },
                |_| panic!("must not succeed"),
                |timeout| failure.set(Some(timeout)),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ClusterError::Timeout { ref condition, timeout }
                if condition == "never" && timeout == Duration::from_secs(3)
        ));
        assert_eq!(failure.get(), Some(Duration::from_secs(3)));
        assert_eq!(attempts.get(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_longer_than_timeout_waits_out_timeout() {
        let attempts = Cell::new(0u32);
        let start = Instant::now();

        let err = Poller::new("slow", Duration::from_secs(3))
            .with_interval(Duration::from_secs(10))
            .wait_for(|| {
                attempts.set(attempts.get() + 1);
                async { Ok(false) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ClusterError::Timeout { .. }));
        assert_eq!(attempts.get(), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_condition_error_aborts() {
        let attempts = Cell::new(0u32);
        let err = Poller::new("broken", Duration::from_secs(30))
            .wait_for(|| {
                attempts.set(attempts.get() + 1);
                async { Err::<bool, _>(ClusterError::Config("boom".into())) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ClusterError::Config(_)));
        assert_eq!(attempts.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_to_success_restarts_on_false() {
        let results = [true, false, true, true, true];
        let attempts = Cell::new(0usize);

        let elapsed = Poller::new("stable", Duration::from_secs(30))
            .with_time_to_success(Duration::from_secs(2))
            .wait_for(|| {
                let i = attempts.get();
                attempts.set(i + 1);
                let outcome = results.get(i).copied().unwrap_or(true);
                async move { Ok(outcome) }
            })
            .await
            .unwrap();

        // Holds from t=2 and is accepted at t=4.
        assert_eq!(attempts.get(), 5);
        assert_eq!(elapsed, Duration::from_secs(4));
    }
}
