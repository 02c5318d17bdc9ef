//! Retry utilities for resilient operations
//!
//! A bounded attempt loop with a cool-down between attempts. The cool-down is
//! fixed by default; a multiplier above 1.0 turns it into exponential backoff.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,

    /// Delay in milliseconds before the second attempt
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds (caps exponential growth)
    pub max_delay_ms: u64,

    /// Multiplier applied per attempt (1.0 = fixed cool-down)
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 3_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 1.0,
        }
    }
}

impl RetryConfig {
    /// Fixed cool-down between a bounded number of attempts
    pub fn fixed(max_attempts: u32, cooldown: Duration) -> Self {
        let ms = cooldown.as_millis() as u64;
        Self {
            max_attempts,
            base_delay_ms: ms,
            max_delay_ms: ms,
            backoff_multiplier: 1.0,
        }
    }

    /// Delay to wait after the given (1-based) failed attempt
    pub fn delay_after(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let scaled =
            self.base_delay_ms as f64 * self.backoff_multiplier.powi((attempt - 1) as i32);
        Duration::from_millis((scaled as u64).min(self.max_delay_ms))
    }
}

/// Outcome of a retried operation that gave up
#[derive(Debug)]
pub struct Exhausted<E> {
    /// Attempts actually made
    pub attempts: u32,
    /// Error returned by the final attempt
    pub last_error: E,
}

/// Run `operation` until it succeeds, a non-retryable error occurs, or the
/// attempt budget is spent.
///
/// `operation` receives the 1-based attempt number. The cool-down is only
/// slept when another attempt follows.
///
/// # Example
///
/// ```no_run
/// use fillrate::utils::retry::{with_retry_if, RetryConfig};
///
/// # async fn example() {
/// let config = RetryConfig::default();
/// let result = with_retry_if(
///     &config,
///     |_attempt| async { Ok::<_, std::io::Error>(42) },
///     |_e| true,
/// )
/// .await;
/// assert_eq!(result.unwrap(), 42);
/// # }
/// ```
pub async fn with_retry_if<T, E, F, Fut, P>(
    config: &RetryConfig,
    mut operation: F,
    should_retry: P,
) -> Result<T, Exhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) => {
                if !should_retry(&e) {
                    warn!(attempt, error = %e, "Non-retryable error encountered");
                    return Err(Exhausted {
                        attempts: attempt,
                        last_error: e,
                    });
                }

                warn!(attempt, max_attempts, error = %e, "Attempt failed");

                if attempt >= max_attempts {
                    return Err(Exhausted {
                        attempts: attempt,
                        last_error: e,
                    });
                }

                let delay = config.delay_after(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "Cooling down before retry");
                tokio::time::sleep(delay).await;
            }
        }
    }
}
