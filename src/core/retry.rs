//! Retry logic with exponential backoff
//!
//! Handlers wrap their network-facing calls (uploads, image pushes) in a
//! [`RetryManager`]. The orchestrator itself never retries.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Options for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOptions {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Backoff multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryOptions {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

/// Transient failure patterns worth retrying
const RETRYABLE_PATTERNS: &[&str] = &[
    "RequestTimeout",
    "Throttling",
    "TooManyRequests",
    "SlowDown",
    "ServiceUnavailable",
    "InternalError",
    "connection reset",
    "connection refused",
    "broken pipe",
    "timed out",
    "timeout",
    "TLS handshake",
    "unexpected EOF",
];

/// Retry manager for executing operations with exponential backoff
///
/// # Examples
///
/// ```no_run
/// use asset_publisher::core::{RetryManager, RetryOptions};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let manager = RetryManager::new(RetryOptions::default());
///
///     let result = manager.retry(|| async {
///         Ok::<_, anyhow::Error>("uploaded")
///     }).await?;
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RetryManager {
    options: RetryOptions,
}

impl RetryManager {
    pub fn new(options: RetryOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RetryOptions {
        &self.options
    }

    /// Execute the given async operation with retry logic
    ///
    /// Non-retryable errors are returned immediately; retryable ones are
    /// retried until `max_attempts` is reached.
    pub async fn retry<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut delay = self.options.initial_delay;
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    if attempt >= self.options.max_attempts || !Self::is_retryable_error(&error) {
                        return Err(error);
                    }

                    warn!(
                        attempt,
                        max_attempts = self.options.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "retrying after transient error: {:#}",
                        error
                    );

                    sleep(delay).await;

                    delay = Duration::from_secs_f64(
                        delay.as_secs_f64() * self.options.backoff_multiplier,
                    )
                    .min(self.options.max_delay);
                    attempt += 1;
                }
            }
        }
    }

    /// Check if an error should be retried
    fn is_retryable_error<E: std::fmt::Display>(error: &E) -> bool {
        let error_msg = format!("{:#}", error).to_lowercase();

        RETRYABLE_PATTERNS
            .iter()
            .any(|pattern| error_msg.contains(&pattern.to_lowercase()))
    }
}
