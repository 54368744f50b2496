//! Remote call retry policy
//!
//! Wraps one remote call with bounded exponential backoff.
//!
//! **Algorithm:**
//! 1. Attempt operation
//! 2. If successful, return result
//! 3. If `Retryable`:
//!    a. If attempts < max_attempts: log WARN, back off, retry
//!    b. Otherwise: re-classify as `NonRetryable` and return
//! 4. If `NonRetryable` or `QuotaExceeded`: return immediately (no retry)
//!
//! **Backoff Strategy:**
//! - Delay after failure n: `base_delay * 2^(n-1)` plus jitter in `[0, jitter)`
//! - Jitter is clamped below `base_delay`, so uncapped delays strictly increase
//! - Capped at `max_delay`
//!
//! Budgets are per call: every wrapped call starts from attempt 1.

use crate::error::RemoteError;
use mabot_common::config::RetryConfig;
use rand::Rng;
use std::time::{Duration, Instant};

/// Bounded exponential backoff settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: Duration::from_millis(config.jitter_ms),
        }
    }

    /// Same policy without jitter (deterministic delays)
    pub fn without_jitter(mut self) -> Self {
        self.jitter = Duration::ZERO;
        self
    }

    /// Delay before retrying after the `failures`-th consecutive failure (1-based)
    pub fn delay_for_attempt(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        let base_ms = self.base_delay.as_millis() as u64;
        let backoff_ms = base_ms.saturating_mul(1u64 << exponent);

        let jitter_ms = self.jitter.min(self.base_delay).as_millis() as u64;
        let jitter_ms = if jitter_ms > 0 {
            rand::thread_rng().gen_range(0..jitter_ms)
        } else {
            0
        };

        Duration::from_millis(backoff_ms.saturating_add(jitter_ms)).min(self.max_delay)
    }
}

/// Run `operation` under `policy`
///
/// # Arguments
/// * `operation_name` - Name for logging (e.g., "download", "warehouse insert")
/// * `policy` - Attempt budget and backoff
/// * `operation` - Async closure performing the remote call
///
/// # Returns
/// The operation's value, or an error that is never `Retryable`.
pub async fn with_retry<F, Fut, T>(
    operation_name: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, RemoteError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, RemoteError>>,
{
    let start_time = Instant::now();
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        if attempt > 1 {
            tracing::debug!(operation = operation_name, attempt, "Retrying remote call");
        }

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Remote call succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(RemoteError::Retryable(msg)) => {
                if attempt >= max_attempts {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        error = %msg,
                        "Remote call failed: retries exhausted"
                    );
                    return Err(RemoteError::NonRetryable(format!(
                        "{} (gave up after {} attempts)",
                        msg, attempt
                    )));
                }

                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %msg,
                    "Transient failure, will retry after backoff"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                // NonRetryable and QuotaExceeded are returned untouched
                tracing::debug!(
                    operation = operation_name,
                    attempt,
                    kind = %err.kind(),
                    "Remote call failed without retry"
                );
                return Err(err);
            }
        }
    }
}
