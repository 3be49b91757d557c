//! Fixed-count retry helper.

use std::future::Future;
use std::time::Duration;

/// `max_attempts` tries, `interval` apart. Zero attempts is treated as one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        RetryPolicy {
            max_attempts,
            interval,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Run `op` until it succeeds or the policy is exhausted.
///
/// Sleeps `interval` between attempts, never after the last one. Returns the
/// last error when every attempt failed.
pub async fn retry_until<T, E, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = policy.attempts();
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= attempts => return Err(e),
            Err(_) => {
                attempt += 1;
                tokio::time::sleep(policy.interval).await;
            }
        }
    }
}
