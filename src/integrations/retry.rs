//! Bounded retry with linear backoff for notifier calls.
//!
//! Every attempt runs under its own timeout. Network errors and timeouts are retried
//! until `max_attempts` is reached, waiting `n * backoff` after the n-th failure.
//! Any other error, or a response from the remote side, ends the loop.

use crate::config::DeliverySettings;
use crate::integrations::notifier::NotifierError;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

/// Retry configuration for one kind of call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first one
    pub max_attempts: u32,
    /// Linear backoff step
    pub backoff: Duration,
    /// Deadline of a single attempt
    pub timeout: Duration,
}

impl RetryPolicy {
    /// Policy for single messages and documents.
    #[must_use]
    pub const fn for_requests(settings: &DeliverySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            backoff: Duration::from_millis(settings.backoff_ms),
            timeout: settings.request_timeout(),
        }
    }

    /// Policy for album uploads, which get a longer deadline.
    #[must_use]
    pub const fn for_albums(settings: &DeliverySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            backoff: Duration::from_millis(settings.backoff_ms),
            timeout: settings.album_timeout(),
        }
    }

    /// Wait after the `attempt`-th failure (1-based).
    #[must_use]
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

/// Runs `f` under `policy`, retrying retryable failures.
pub async fn send_with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    operation: &str,
    f: F,
) -> Result<T, NotifierError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, NotifierError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let outcome = match timeout(policy.timeout, f()).await {
            Ok(result) => result,
            Err(_) => Err(NotifierError::Timeout(policy.timeout)),
        };

        match outcome {
            Ok(value) => {
                if attempt > 1 {
                    info!(operation, attempt, "Notifier call succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) if error.is_retryable() && attempt < max_attempts => {
                let wait = policy.backoff_after(attempt);
                warn!(
                    operation,
                    attempt,
                    wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                    %error,
                    "Notifier call failed, retrying"
                );
                sleep(wait).await;
                attempt += 1;
            }
            Err(error) => {
                warn!(operation, attempt, %error, "Notifier call failed");
                return Err(error);
            }
        }
    }
}
