//! Transport-level retry with exponential backoff
//!
//! Only requests that never produced an HTTP status (connect failures,
//! timeouts) are retried here. Status responses, 429 included, go back to the
//! caller untouched so the run boundary can turn them into DELAY or ERROR.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt)
    pub max_retries: u32,

    pub initial_backoff: Duration,

    pub max_backoff: Duration,

    /// Backoff multiplier (2.0 for exponential backoff)
    pub multiplier: f64,

    /// Add up to 25% random jitter
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Single attempt, no retries
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Calculate backoff duration for a given attempt
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        let base = self.initial_backoff.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_backoff.as_secs_f64());

        let final_duration = if self.jitter {
            capped * (1.0 + rand_jitter() * 0.25)
        } else {
            capped
        };

        Duration::from_secs_f64(final_duration)
    }
}

/// Pseudo-random jitter in [0.0, 1.0) from the clock's sub-second nanos
fn rand_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos % 1000) as f64 / 1000.0
}

/// Retry classification for errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    NoRetry,
}

/// Errors that know whether repeating the request could help
pub trait RetryableError {
    fn retry_decision(&self) -> RetryDecision;
}

/// Execute an async operation, retrying transient failures
pub async fn with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError + std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        let err = match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        if err.retry_decision() == RetryDecision::NoRetry {
            debug!(operation = operation_name, attempt, "Non-retryable error: {}", err);
            return Err(err);
        }

        if attempt >= config.max_retries {
            warn!(
                operation = operation_name,
                attempts = attempt + 1,
                "Giving up after {} attempts: {}",
                attempt + 1,
                err
            );
            return Err(err);
        }

        let backoff = config.backoff_duration(attempt);
        warn!(
            operation = operation_name,
            attempt = attempt + 1,
            backoff_ms = backoff.as_millis() as u64,
            "Retrying after transport error: {}",
            err
        );

        sleep(backoff).await;
        attempt += 1;
    }
}
