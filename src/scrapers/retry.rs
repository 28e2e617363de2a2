use crate::config::RetryConfig;
use crate::error::FetchError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Exponential backoff with multiplicative jitter:
/// `delay(n) = base * factor^n * j`, `j` drawn from `[jitter_min, jitter_max]`,
/// capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub factor: f64,
    pub max_delay: Duration,
    pub jitter_min: f64,
    pub jitter_max: f64,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        let (jitter_min, jitter_max) = if config.jitter_min <= config.jitter_max {
            (config.jitter_min, config.jitter_max)
        } else {
            (config.jitter_max, config.jitter_min)
        };
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            factor: config.backoff_factor.max(1.0),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter_min: jitter_min.max(0.0),
            jitter_max: jitter_max.max(0.0),
        }
    }

    fn nominal_ms(&self, retry: u32) -> f64 {
        self.base_delay.as_millis() as f64 * self.factor.powi(retry as i32)
    }

    fn capped(&self, ms: f64) -> Duration {
        Duration::from_millis(ms.min(self.max_delay.as_millis() as f64) as u64)
    }

    /// Smallest and largest delay the jitter can produce for the `retry`-th retry.
    pub fn delay_bounds(&self, retry: u32) -> (Duration, Duration) {
        let nominal = self.nominal_ms(retry);
        (
            self.capped(nominal * self.jitter_min),
            self.capped(nominal * self.jitter_max),
        )
    }

    pub fn delay_for<R: Rng>(&self, retry: u32, rng: &mut R) -> Duration {
        let jitter = if self.jitter_max > self.jitter_min {
            rng.gen_range(self.jitter_min..=self.jitter_max)
        } else {
            self.jitter_min
        };
        self.capped(self.nominal_ms(retry) * jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Runs `operation` until it succeeds, fails permanently, or the policy runs
/// out of retries. A `Retry-After` hint on a 429 raises the wait to at least
/// that many seconds.
pub async fn with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    url: &str,
    mut operation: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut retries = 0u32;
    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => err,
        };

        if retries >= policy.max_retries {
            return Err(FetchError::RetriesExhausted {
                url: url.to_string(),
                attempts: retries + 1,
                last: err.to_string(),
            });
        }
        retries += 1;

        let mut delay = policy.delay_for(retries, &mut rand::thread_rng());
        if let FetchError::RateLimited {
            retry_after_secs: Some(secs),
            ..
        } = &err
        {
            delay = delay.max(Duration::from_secs(*secs));
        }

        warn!(
            url,
            retry = retries,
            max = policy.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Retrying after transient error"
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            factor: 2.0,
            max_delay: Duration::from_millis(20),
            jitter_min: 0.5,
            jitter_max: 1.5,
        }
    }

    #[test]
    fn delay_bounds_never_decrease() {
        let policy = RetryPolicy::default();
        let mut previous = (Duration::ZERO, Duration::ZERO);
        for retry in 0..12 {
            let bounds = policy.delay_bounds(retry);
            assert!(bounds.0 >= previous.0, "lower bound dropped at retry {retry}");
            assert!(bounds.1 >= previous.1, "upper bound dropped at retry {retry}");
            assert!(bounds.0 <= bounds.1);
            previous = bounds;
        }
        assert_eq!(previous.1, policy.max_delay);
    }

    #[test]
    fn sampled_delays_fall_within_bounds() {
        let policy = RetryPolicy::default();
        let mut rng = rand::thread_rng();
        for retry in 0..8 {
            let (low, high) = policy.delay_bounds(retry);
            for _ in 0..100 {
                let delay = policy.delay_for(retry, &mut rng);
                assert!(delay >= low && delay <= high);
            }
        }
    }

    #[test]
    fn first_retry_waits_two_to_six_seconds() {
        // base 2s, factor 2: first retry waits 4s scaled by jitter 0.5..1.5
        let (low, high) = RetryPolicy::default().delay_bounds(1);
        assert_eq!(low, Duration::from_secs(2));
        assert_eq!(high, Duration::from_secs(6));
    }

    #[tokio::test]
    async fn retries_server_errors_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_backoff(&fast_policy(3), "https://example.test/1", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(FetchError::Status {
                        url: "https://example.test/1".into(),
                        status: 503,
                    })
                } else {
                    Ok("<html></html>")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "<html></html>");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_backoff(&fast_policy(3), "u", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(FetchError::Status {
                    url: "u".into(),
                    status: 404,
                })
            }
        })
        .await;

        assert!(matches!(result, Err(FetchError::Status { status: 404, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_backoff(&fast_policy(2), "u", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(FetchError::RateLimited {
                    url: "u".into(),
                    retry_after_secs: None,
                })
            }
        })
        .await;

        assert!(matches!(
            result,
            Err(FetchError::RetriesExhausted { attempts: 3, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
