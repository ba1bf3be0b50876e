//! Exponential backoff for transient storage errors (spec.md §4.1 "Failure semantics").

use std::future::Future;
use std::time::Duration;

use crate::error::{StoreError, StoreResult};

const MAX_ATTEMPTS: u32 = 4;
const BASE_DELAY_MS: u64 = 20;

/// Retries `op` with exponential backoff while it returns a transient error,
/// up to `MAX_ATTEMPTS` attempts. Permanent errors propagate immediately.
pub async fn with_backoff<T, F, Fut>(mut op: F) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt + 1 < MAX_ATTEMPTS => {
                let delay = BASE_DELAY_MS * 2u64.pow(attempt);
                tracing::warn!(attempt, delay_ms = delay, error = %err, "retrying transient storage error");
                tokio::time::sleep(Duration::from_millis(delay)).await;
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

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let result: StoreResult<u32> = with_backoff(|| async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(StoreError::Transient("not yet".into()))
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test]
    async fn permanent_errors_do_not_retry() {
        let calls = AtomicU32::new(0);
        let result: StoreResult<u32> = with_backoff(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::IdentityNotFound("x".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
