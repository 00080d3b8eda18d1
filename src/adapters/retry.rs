//! Bounded retry with exponential backoff for transient adapter errors.
//!
//! Only `AdapterError::Network` is ever retried. Signature, liquidity and
//! slippage errors are terminal for the attempt and returned immediately.

use std::future::Future;
use std::time::Duration;

use crate::ports::chain::AdapterError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_millis(base_delay_ms),
            ..Self::default()
        }
    }
}

/// Run `op` until it succeeds, fails terminally, or the retry budget is
/// exhausted.
pub async fn with_backoff<T, F, Fut>(
    policy: RetryPolicy,
    what: &str,
    mut op: F,
) -> Result<T, AdapterError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AdapterError>>,
{
    let mut delay = policy.base_delay;
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                tracing::warn!(
                    %err,
                    attempt,
                    max_attempts = policy.max_attempts,
                    "{what}: transient error, backing off {delay:?}"
                );
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(policy.max_delay);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[tokio::test]
    async fn test_transient_error_is_retried() {
        let calls = AtomicU32::new(0);
        let result = with_backoff(fast_policy(), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(AdapterError::Network("flaky".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    // Aggregator clients take their request parameters as `&str`, so the
    // returned future borrows them; the closure must hand out references
    // to values bound outside it, not to temporaries it creates.
    async fn quote_pair(src: &str, dst: &str) -> Result<String, AdapterError> {
        Ok(format!("{src}->{dst}"))
    }

    #[tokio::test]
    async fn test_closure_borrows_request_params_across_attempts() {
        let src = format!("{:#042x}", 0x1111u32);
        let dst = format!("{:#042x}", 0x2222u32);
        let result = with_backoff(fast_policy(), "test", || quote_pair(&src, &dst)).await;
        assert_eq!(result.unwrap(), format!("{src}->{dst}"));
    }

    #[tokio::test]
    async fn test_terminal_error_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, _> = with_backoff(fast_policy(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AdapterError::SlippageExceeded) }
        })
        .await;
        assert!(matches!(result, Err(AdapterError::SlippageExceeded)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, _> = with_backoff(fast_policy(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AdapterError::Network("down".into())) }
        })
        .await;
        assert!(matches!(result, Err(AdapterError::Network(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
