/*!
 * Bounded exponential backoff for collaborator calls.
 *
 * Only transient errors (network failures, 5xx, rate limiting) are retried.
 * Deterministic answers such as 404 or bad credentials return immediately.
 */

use log::warn;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

use crate::errors::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further retry
    pub backoff_base_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_base_ms: u64) -> Self {
        Self { max_retries, backoff_base_ms }
    }

    /// Single attempt, no retries
    pub fn none() -> Self {
        Self::new(0, 0)
    }

    /// Backoff before retry number `attempt` (1-based), plus up to 25% jitter
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.backoff_base_ms.saturating_mul(1u64 << (attempt.saturating_sub(1)).min(16));
        let jitter = if base >= 4 { rand::rng().random_range(0..=base / 4) } else { 0 };
        Duration::from_millis(base + jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, 1000)
    }
}

/// Run `operation` until it succeeds, fails deterministically, or the
/// retries are used up. `what` names the call in log lines.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut operation: F) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) => {
                attempt += 1;
                if attempt > policy.max_retries {
                    return Err(e);
                }
                warn!(
                    "{} failed: {} - attempt {}/{}",
                    what,
                    e,
                    attempt,
                    policy.max_retries + 1
                );
                tokio::time::sleep(policy.delay(attempt)).await;
            }
        }
    }
}
