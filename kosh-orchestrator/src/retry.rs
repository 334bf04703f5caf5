use std::future::Future;
use std::time::Duration;

use kosh_common::Result;

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(50);

/// Retries a transient-failure-prone section with bounded exponential
/// backoff, inside a single request.
///
/// Business rejections are returned immediately; only errors marked
/// transient (lock timeouts, store unavailability) are retried. On
/// exhaustion the last transient error surfaces as `Internal`.
pub async fn with_backoff<T, F, Fut>(operation: &str, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = INITIAL_BACKOFF;
    let mut attempt = 1;
    loop {
        match f().await {
            Err(e) if e.is_transient() && attempt < MAX_ATTEMPTS => {
                tracing::warn!(operation, attempt, error = %e, "transient failure, backing off");
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kosh_common::CoreError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_transient_errors_retried_then_succeed() {
        let calls = AtomicU32::new(0);
        let result = with_backoff("test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(CoreError::internal("flaky"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_business_errors_never_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_backoff("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(CoreError::InsufficientFunds {
                    available: kosh_common::Paise(0),
                    requested: kosh_common::Paise(1),
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_surfaces_last_error() {
        let result: Result<()> =
            with_backoff("test", || async { Err(CoreError::internal("down")) }).await;
        assert!(matches!(result, Err(CoreError::Internal(_))));
    }
}
