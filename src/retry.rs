//! Retry with exponential backoff for request-level failures
//!
//! Part-level requests (range GET, UploadPart) are retried here, inside
//! the client. The transfer engine itself never retries: a part that
//! exhausts its attempts becomes a failed part result and is picked up
//! again on the next resumed call.

use crate::error::Result;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first)
    pub max_attempts: u32,

    /// Initial delay before first retry
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Jitter factor (0.0-1.0)
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(60),
            jitter_factor: 0.3,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with a given attempt budget and default delays
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Single-attempt policy (retries disabled)
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Calculate delay for a given attempt number (1-based)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let multiplier = 2_u32.saturating_pow(attempt.saturating_sub(1));
        let capped = (self.initial_delay * multiplier).min(self.max_delay);

        if self.jitter_factor > 0.0 {
            let jitter = rand::rng().random_range(0.0..self.jitter_factor);
            capped + Duration::from_secs_f64(capped.as_secs_f64() * jitter)
        } else {
            capped
        }
    }
}

/// Execute an operation, retrying retryable failures with backoff
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if attempt >= policy.max_attempts || !e.is_retryable() {
                    return Err(e);
                }

                let delay = policy.calculate_delay(attempt);
                tracing::debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retrying after transient failure"
                );
                sleep(delay).await;
            }
        }
    }
}
