//! Retry policies around [`OpsError`]-returning operations.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use super::OpsError;

/// Exponential backoff used by the batch copier.
///
/// FloodWait sleeps exactly the mandated duration and does not consume a
/// retry. Other transient errors back off 1, 2, 4 ... up to `cap`, and give
/// up after `max_retries` retries. Permanent errors return immediately.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl BackoffPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base: Duration::from_secs(1),
            cap: Duration::from_secs(20),
        }
    }

    /// Delay before retry number `retry` (0-based).
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }

    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, OpsError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, OpsError>>,
    {
        let mut retries = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(OpsError::RateLimited(wait)) => {
                    debug!("{}: flood wait {:?}", what, wait);
                    tokio::time::sleep(wait).await;
                }
                Err(e) if e.is_transient() && retries < self.max_retries => {
                    let delay = self.delay(retries);
                    retries += 1;
                    debug!("{}: {} (retry {}/{} in {:?})", what, e, retries, self.max_retries, delay);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!("{}: giving up after {} retries: {}", what, retries, e);
                    return Err(e);
                }
            }
        }
    }
}

/// Retry wrapper for user-facing sends.
///
/// Every attempt counts against `max_attempts`. Timeouts back off linearly,
/// FloodWait sleeps the mandated wait plus `flood_buffer`, other transient
/// errors back off exponentially.
#[derive(Debug, Clone, Copy)]
pub struct SendRetry {
    pub max_attempts: u32,
    pub timeout_step: Duration,
    pub flood_buffer: Duration,
}

impl Default for SendRetry {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            timeout_step: Duration::from_secs(1),
            flood_buffer: Duration::from_secs(1),
        }
    }
}

impl SendRetry {
    /// Run `op`, reporting each transient failure to `observe` before sleeping.
    pub async fn run<T, F, Fut, O>(&self, mut op: F, mut observe: O) -> Result<T, OpsError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, OpsError>>,
        O: FnMut(&OpsError),
    {
        let mut attempt = 1;
        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !err.is_transient() || attempt >= self.max_attempts {
                return Err(err);
            }
            observe(&err);

            let delay = match &err {
                OpsError::Timeout => self.timeout_step * attempt,
                OpsError::RateLimited(wait) => *wait + self.flood_buffer,
                _ => Duration::from_secs(1u64 << attempt.min(6)),
            };
            debug!("send failed ({}), attempt {}/{}, sleeping {:?}", err, attempt, self.max_attempts, delay);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::time::Instant;

    use super::*;

    #[test]
    fn test_backoff_delays_cap_at_twenty() {
        let policy = BackoffPolicy::new(10);
        let delays: Vec<u64> = (0..7).map(|r| policy.delay(r).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 20, 20]);
        assert_eq!(policy.delay(40).as_secs(), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flood_wait_does_not_use_budget() {
        let policy = BackoffPolicy::new(1);
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let start = Instant::now();

        let result = policy
            .run("copy", move || async move {
                match calls.fetch_add(1, Ordering::SeqCst) {
                    0..=2 => Err(OpsError::RateLimited(Duration::from_secs(7))),
                    3 => Err(OpsError::Timeout),
                    _ => Ok(5),
                }
            })
            .await;

        assert_eq!(result, Ok(5));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(start.elapsed(), Duration::from_secs(7 * 3 + 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_gives_up() {
        let policy = BackoffPolicy::new(3);
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let result: Result<(), _> = policy
            .run("copy", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(OpsError::Network("reset".into()))
            })
            .await;

        assert!(matches!(result, Err(OpsError::Network(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_does_not_retry_permanent() {
        let policy = BackoffPolicy::new(3);
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let result: Result<(), _> = policy
            .run("copy", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(OpsError::NotFound("gone".into()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_retry_timings() {
        let retry = SendRetry::default();
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let mut seen = Vec::new();
        let start = Instant::now();

        let result = retry
            .run(
                move || async move {
                    match calls.fetch_add(1, Ordering::SeqCst) {
                        0 => Err(OpsError::Timeout),
                        1 => Err(OpsError::RateLimited(Duration::from_secs(3))),
                        _ => Ok("sent"),
                    }
                },
                |e| seen.push(e.clone()),
            )
            .await;

        assert_eq!(result, Ok("sent"));
        assert_eq!(seen.len(), 2);
        // 1s linear timeout step, then 3s flood wait + 1s buffer.
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_retry_bounded() {
        let retry = SendRetry::default();
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let result: Result<(), _> = retry
            .run(
                move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(OpsError::RateLimited(Duration::from_secs(1)))
                },
                |_| {},
            )
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
