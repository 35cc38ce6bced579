use crate::errors::AppError;
use failsafe::backoff;
use std::future::Future;
use std::time::Duration;
use tracing;

/// Re-runs `check` until it yields a value, up to `attempts` times, sleeping `delay`
/// between tries.
///
/// Used to wait out the replication window after a write. Errors from `check` are
/// logged and count as a failed attempt. There is no sleep after the last attempt.
///
/// # Example
///
/// ```rust,ignore
/// let row = poll_until(5, Duration::from_millis(500), || async {
///     client.from("founders").eq("id", id).maybe_single::<FounderProfile>().await
/// })
/// .await;
/// ```
pub async fn poll_until<T, F, Fut>(attempts: usize, delay: Duration, check: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, AppError>>,
{
    poll_with_delays(attempts, backoff::constant(delay), check).await
}

/// Like [`poll_until`], with delays doubling from `start` up to `max`.
pub async fn poll_until_with_backoff<T, F, Fut>(
    attempts: usize,
    start: Duration,
    max: Duration,
    check: F,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, AppError>>,
{
    poll_with_delays(attempts, backoff::exponential(start, max), check).await
}

async fn poll_with_delays<T, F, Fut, D>(attempts: usize, mut delays: D, mut check: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, AppError>>,
    D: Iterator<Item = Duration>,
{
    for attempt in 1..=attempts {
        match check().await {
            Ok(Some(value)) => {
                tracing::debug!("Poll succeeded on attempt {}/{}", attempt, attempts);
                return Some(value);
            }
            Ok(None) => tracing::debug!("Poll attempt {}/{}: not yet", attempt, attempts),
            Err(e) => tracing::warn!("Poll attempt {}/{} failed: {}", attempt, attempts, e),
        }

        if attempt < attempts {
            if let Some(delay) = delays.next() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    tracing::warn!("Gave up after {} attempts", attempts);
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_returns_first_value() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let result = poll_until(5, Duration::from_millis(1), move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(if n >= 3 { Some(n) } else { None })
            }
        })
        .await;

        assert_eq!(result, Some(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_attempts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let result: Option<()> = poll_until(4, Duration::from_millis(1), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }
        })
        .await;

        assert!(result.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_errors_count_as_attempts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let result = poll_until(3, Duration::from_millis(1), move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(AppError::ExternalApiError("not replicated".into()))
                } else {
                    Ok(Some("row"))
                }
            }
        })
        .await;

        assert_eq!(result, Some("row"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_attempts_never_checks() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let result: Option<()> = poll_until(0, Duration::from_secs(10), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Some(()))
            }
        })
        .await;

        assert!(result.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_backoff_variant_polls() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let result = poll_until_with_backoff(
            3,
            Duration::from_millis(1),
            Duration::from_millis(4),
            move || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    Ok(if n == 2 { Some(n) } else { None })
                }
            },
        )
        .await;

        assert_eq!(result, Some(2));
    }
}
