//! Rate-limit retry with exponential backoff and jitter.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use super::AnalyticsError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: usize,
    /// Multiplied by `3^attempt`
    pub base_delay: Duration,
    /// Upper bound of the random extra delay
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 6,
            base_delay: Duration::from_millis(2000),
            max_jitter: Duration::from_millis(2000),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), without jitter
    pub fn backoff(&self, attempt: usize) -> Duration {
        let factor = 3u32.saturating_pow(attempt as u32);
        self.base_delay.saturating_mul(factor)
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
    }
}

/// Run `op`, retrying only while the engine answers with a rate limit.
///
/// Any other error is returned immediately.
pub async fn with_rate_limit_retry<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut op: F,
) -> Result<T, AnalyticsError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AnalyticsError>>,
{
    let mut retries = 0usize;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_rate_limited() => {
                if retries >= policy.max_retries {
                    return Err(AnalyticsError::RetriesExhausted(retries));
                }
                retries += 1;
                let delay = policy.backoff(retries) + policy.jitter();
                warn!(
                    what,
                    retry = retries,
                    delay_secs = delay.as_secs_f64(),
                    "Query engine rate limit hit, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn instant_policy(max_retries: usize) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }

    #[test]
    fn backoff_grows_by_powers_of_three() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(6_000));
        assert_eq!(policy.backoff(2), Duration::from_millis(18_000));
        assert_eq!(policy.backoff(3), Duration::from_millis(54_000));
    }

    #[tokio::test]
    async fn retries_rate_limits_until_success() {
        let calls = AtomicUsize::new(0);
        let result = with_rate_limit_retry(&instant_policy(6), "status", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(AnalyticsError::RateLimited)
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = with_rate_limit_retry(&instant_policy(6), "execute", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(AnalyticsError::Http {
                    status: 500,
                    body: "boom".to_string(),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(AnalyticsError::Http { status: 500, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = with_rate_limit_retry(&instant_policy(6), "results", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AnalyticsError::RateLimited) }
        })
        .await;

        assert!(matches!(result, Err(AnalyticsError::RetriesExhausted(6))));
        assert_eq!(calls.load(Ordering::SeqCst), 7);
    }
}
