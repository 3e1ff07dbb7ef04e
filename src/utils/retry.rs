use std::time::Duration;
use tokio::time::sleep;

// ============================================================================
// Exponential Backoff Retry Strategy
// ============================================================================
//
// Retries an operation while it keeps failing with a transient error.
// Permanent errors (anything whose `is_transient()` is false) end the loop
// immediately so that NotFound / InvalidPayload answers reach the caller
// without burning the retry budget.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for a single delay
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    fn next_delay(&self, delay: Duration) -> Duration {
        let next = Duration::from_millis(((delay.as_millis() as f64) * self.multiplier) as u64);
        next.min(self.max_delay)
    }
}

/// Result of a retry operation
#[derive(Debug)]
pub enum RetryResult<T, E> {
    /// Operation succeeded
    Success(T),
    /// Operation kept failing transiently until attempts ran out
    Failed(E),
    /// Operation failed with an error that must not be retried
    PermanentFailure(E),
}

/// Check if an error is transient (should retry) or permanent (should not retry)
pub trait IsTransient {
    fn is_transient(&self) -> bool;
}

/// Run `operation` until it succeeds, fails permanently or runs out of
/// attempts. The closure receives the 1-based attempt number. `name` only
/// labels the log lines.
pub async fn retry_on_transient<F, Fut, T, E>(
    name: &str,
    config: RetryConfig,
    mut operation: F,
) -> RetryResult<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display + IsTransient,
{
    let mut delay = config.initial_delay;

    for attempt in 1..=config.max_attempts.max(1) {
        let error = match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(operation = name, attempt, "Succeeded after retry");
                }
                return RetryResult::Success(value);
            }
            Err(error) => error,
        };

        if !error.is_transient() {
            tracing::debug!(operation = name, error = %error, "Permanent failure, not retrying");
            return RetryResult::PermanentFailure(error);
        }

        if attempt >= config.max_attempts {
            tracing::error!(operation = name, attempt, error = %error, "Retry budget exhausted");
            return RetryResult::Failed(error);
        }

        tracing::warn!(
            operation = name,
            attempt,
            max_attempts = config.max_attempts,
            backoff_ms = delay.as_millis() as u64,
            error = %error,
            "Transient failure, backing off"
        );
        sleep(delay).await;
        delay = config.next_delay(delay);
    }

    unreachable!("the last attempt always returns")
}
