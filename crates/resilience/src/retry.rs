//! Bounded retry with decorrelated exponential backoff.

use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry `attempt` (1-indexed):
    /// `min(max_delay, floor(base_delay * 1.5^attempt * jitter))` with jitter
    /// uniform in [0.9, 1.1] to decorrelate concurrent retry storms.
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let jitter: f64 = rand::thread_rng().gen_range(0.9..=1.1);
        let backoff = self.base_delay.as_millis() as f64 * 1.5_f64.powi(attempt as i32) * jitter;
        let capped = backoff.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped.floor() as u64)
    }
}

/// Run `operation` until it succeeds or `max_retries` retries are exhausted
/// (at most `max_retries + 1` invocations). Each failed attempt is logged
/// before the backoff is awaited; the last attempt's error is propagated.
pub async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt: u32 = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                warn!(
                    "{} failed (attempt {}/{}): {}",
                    label,
                    attempt,
                    policy.max_retries + 1,
                    err
                );
                if attempt > policy.max_retries {
                    return Err(err);
                }
                tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
            }
        }
    }
}
