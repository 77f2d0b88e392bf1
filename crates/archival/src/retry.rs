//! Fixed-delay retry policy applied to every stage task.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use storm_common::StormResult;

/// How many times a task runs and how long to wait between attempts.
///
/// Configuration and validation errors end the task on the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    /// Pause between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Read `TASK_MAX_ATTEMPTS` and `TASK_RETRY_DELAY_SECS`, defaulting
    /// anything missing or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let attempts = std::env::var("TASK_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_attempts);
        let delay = std::env::var("TASK_RETRY_DELAY_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.delay);
        Self::new(attempts, delay)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts are used up. `op` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, task: &str, mut op: F) -> StormResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = StormResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() || attempt >= self.max_attempts => return Err(e),
                Err(e) => {
                    warn!(
                        task = %task,
                        error = %e,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_secs = self.delay.as_secs(),
                        "Task failed, retrying"
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
