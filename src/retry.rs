use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::ExecutionSettings;

/// Fixed-count, fixed-delay retry. No backoff, no jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(1_000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    pub fn from_config(settings: &ExecutionSettings) -> Self {
        Self::new(
            settings.retry_count,
            Duration::from_millis(settings.retry_delay_ms),
        )
    }
}

/// Run `op` until it succeeds or `policy.max_attempts` attempts have failed,
/// sleeping `policy.delay` between attempts. The last error is returned as
/// is. A policy of zero attempts still runs `op` once.
pub async fn retry<T, E, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if attempt < attempts => {
                warn!(attempt, max_attempts = attempts, error = %e, "attempt failed, retrying");
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::error::Error;

    fn quick(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn persistent_failure_runs_max_attempts_and_keeps_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Error> = retry(quick(4), || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            Err(Error::ElementNotFound(format!("attempt {n}")))
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match result {
            Err(Error::ElementNotFound(msg)) => assert_eq!(msg, "attempt 4"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn stops_at_first_success() {
        let calls = AtomicU32::new(0);
        let value = retry(quick(5), || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(Error::Timeout("not yet".into()))
            } else {
                Ok(n)
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn zero_attempts_still_runs_once() {
        let calls = AtomicU32::new(0);
        let _: Result<(), Error> = retry(quick(0), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Timeout("x".into()))
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_the_fixed_delay_between_attempts() {
        let started = tokio::time::Instant::now();
        let _: Result<(), Error> = retry(RetryPolicy::new(3, Duration::from_secs(2)), || async {
            Err(Error::Timeout("x".into()))
        })
        .await;
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(4) && elapsed < Duration::from_secs(5));
    }

    #[test]
    fn policy_reads_execution_settings() {
        let settings = ExecutionSettings {
            retry_count: 2,
            retry_delay_ms: 250,
            ..ExecutionSettings::default()
        };
        assert_eq!(
            RetryPolicy::from_config(&settings),
            RetryPolicy::new(2, Duration::from_millis(250))
        );
    }
}
