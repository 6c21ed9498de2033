//! Timeout and Cancellation Helpers
//!
//! Every provider call carries its own deadline, reported as a distinct
//! timeout error. Calls also race the caller's cancellation token.
//!
//! ## Usage
//!
//! ```ignore
//! let completion = with_timeout(
//!     config.timeout(),
//!     async { client.complete(&request).await.map_err(ForgeError::from) },
//!     "openai completion",
//! )
//! .await?;
//! ```

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::types::{ForgeError, Result};

/// Execute an async operation with a timeout
///
/// Returns [`ForgeError::Timeout`] if the operation doesn't complete in time.
pub async fn with_timeout<T, F>(timeout: Duration, future: F, operation_name: &str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(ForgeError::timeout(operation_name, timeout)),
    }
}

/// Like [`with_timeout`] for futures that do not return a `Result`
pub async fn with_timeout_map<T, F>(timeout: Duration, future: F, operation_name: &str) -> Result<T>
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => Ok(result),
        Err(_) => Err(ForgeError::timeout(operation_name, timeout)),
    }
}

/// Race a future against cancellation; the future is dropped on cancel
pub async fn with_cancel<T, F>(cancel: &CancellationToken, future: F, operation_name: &str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ForgeError::Cancelled(operation_name.to_string())),
        result = future => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_success() {
        let result = with_timeout(
            Duration::from_secs(1),
            async { Ok::<_, ForgeError>(42) },
            "test operation",
        )
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result = with_timeout(
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, ForgeError>(42)
            },
            "slow operation",
        )
        .await;
        assert!(matches!(result.unwrap_err(), ForgeError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_with_timeout_map_wraps_value() {
        let result = with_timeout_map(Duration::from_secs(1), async { true }, "probe").await;
        assert!(result.unwrap());
    }

    #[tokio::test]
    async fn test_with_cancel_aborts_in_flight() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let result = with_cancel(
            &cancel,
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, ForgeError>(())
            },
            "long call",
        )
        .await;

        assert!(matches!(result, Err(ForgeError::Cancelled(op)) if op == "long call"));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
