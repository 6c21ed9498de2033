//! Retry Engine
//!
//! Runs an operation up to `max_retries + 1` times, classifying each failure
//! and backing off exponentially with random jitter between attempts.
//! The backoff sleep is the only suspension point and it races the caller's
//! cancellation token.
//!
//! ```text
//! delay(k) = min(base_delay * 2^k + jitter(0..=max_jitter), max_delay)
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::constants::retry as retry_constants;
use crate::types::{BlueprintError, ErrorClassifier, ErrorCode, Result};

/// Retry budget and backoff shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay_ms: u64,
    /// Cap on any single delay, jitter included
    pub max_delay_ms: u64,
    pub max_jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: retry_constants::DEFAULT_MAX_RETRIES,
            base_delay_ms: retry_constants::BASE_DELAY_MS,
            max_delay_ms: retry_constants::MAX_DELAY_MS,
            max_jitter_ms: retry_constants::MAX_JITTER_MS,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay_ms: base_delay.as_millis() as u64,
            ..Default::default()
        }
    }

    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    pub fn with_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter_ms = max_jitter.as_millis() as u64;
        self
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// `base_delay * 2^attempt`, saturating, before jitter and cap
pub fn base_backoff(attempt: u32, policy: &RetryPolicy) -> Duration {
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    Duration::from_millis(policy.base_delay_ms.saturating_mul(factor))
}

/// Delay before retry number `attempt + 1`
pub fn backoff_delay(attempt: u32, policy: &RetryPolicy) -> Duration {
    let jitter_ms = if policy.max_jitter_ms == 0 {
        0
    } else {
        rand::rng().random_range(0..=policy.max_jitter_ms)
    };

    let delay = base_backoff(attempt, policy).saturating_add(Duration::from_millis(jitter_ms));
    delay.min(policy.max_delay())
}

/// Run `operation` with classification, backoff and cancellation.
///
/// Non-retryable errors propagate after one attempt. The classified error is
/// returned unchanged once the budget is exhausted.
pub async fn with_retry<T, F, Fut>(
    operation_name: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> std::result::Result<T, BlueprintError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(BlueprintError::cancelled(operation_name));
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BlueprintError::cancelled(operation_name)),
            outcome = operation() => outcome,
        };

        let err = match outcome {
            Ok(value) => {
                if attempt > 0 {
                    debug!(operation = operation_name, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => ErrorClassifier::classify_error(&err),
        };

        if !err.retryable {
            warn!(
                operation = operation_name,
                code = %err.code,
                error = %err.message,
                "Non-retryable failure"
            );
            return Err(err);
        }

        if attempt >= policy.max_retries {
            warn!(
                operation = operation_name,
                attempts = attempt + 1,
                code = %err.code,
                error = %err.message,
                "Retry budget exhausted"
            );
            return Err(err);
        }

        let delay = backoff_delay(attempt, policy);
        warn!(
            operation = operation_name,
            attempt = attempt + 1,
            max_attempts = policy.max_retries + 1,
            code = %err.code,
            delay_ms = delay.as_millis() as u64,
            "Attempt failed, backing off"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BlueprintError::cancelled(operation_name)),
            _ = tokio::time::sleep(delay) => {}
        }

        attempt += 1;
    }
}

/// [`with_retry`] with a fallback strategy consulted after final failure.
///
/// `fallback` may substitute a value for the classified error. It is never
/// consulted for cancellation.
pub async fn with_retry_fallback<T, F, Fut, FB>(
    operation_name: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    operation: F,
    fallback: FB,
) -> std::result::Result<T, BlueprintError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    FB: FnOnce(&BlueprintError) -> Option<T>,
{
    match with_retry(operation_name, policy, cancel, operation).await {
        Ok(value) => Ok(value),
        Err(err) if err.code == ErrorCode::Cancelled => Err(err),
        Err(err) => match fallback(&err) {
            Some(value) => {
                warn!(
                    operation = operation_name,
                    code = %err.code,
                    "Using fallback after failure"
                );
                Ok(value)
            }
            None => Err(err),
        },
    }
}
