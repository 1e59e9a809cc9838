//! Exponential backoff for transient adjudicator failures.

use std::future::Future;
use std::time::{Duration, Instant};

use clausematch_core::config::AdjudicationSettings;
use clausematch_core::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&AdjudicationSettings::default())
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &AdjudicationSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
        }
    }

    /// Delay before attempt `attempt + 1`, for `attempt >= 1`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

/// Retries `operation` while it fails with a transient error, up to
/// `policy.max_attempts` attempts in total. Permanent errors return at once.
pub async fn with_retry<F, Fut, T>(operation_name: &str, policy: &RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let start = Instant::now();
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start.elapsed().as_millis(),
                        "succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let backoff = policy.backoff(attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms = backoff.as_millis(),
                    error = %err,
                    "transient failure, will retry after backoff"
                );
                tokio::time::sleep(backoff).await;
            }
            Err(err) => {
                if err.is_transient() {
                    tracing::error!(operation = operation_name, attempt, error = %err, "retries exhausted");
                } else {
                    tracing::debug!(operation = operation_name, attempt, error = %err, "permanent failure, not retried");
                }
                return Err(err);
            }
        }
    }
}
