//! Retry with exponential backoff for generative service calls

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::Result;

/// Retry policy for generative service calls
///
/// Controls how many times a failed request is retried and how
/// long to wait between attempts using exponential backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Base delay between retries (doubles each attempt)
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Determine whether an HTTP status and response body indicate a transient failure.
///
/// Rate limits (429) and server errors (5xx) are worth retrying, as is a
/// structured error body whose `error.status` reports overload or exhausted
/// quota. Free-text messages are never inspected.
#[must_use]
pub fn is_transient_status(status: u16, body: &str) -> bool {
    if status == 429 || (500..600).contains(&status) {
        return true;
    }

    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/status")?.as_str().map(str::to_owned))
        .is_some_and(|s| matches!(s.as_str(), "UNAVAILABLE" | "RESOURCE_EXHAUSTED"))
}

/// Parse a `Retry-After` header value expressed in whole seconds
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Compute the backoff delay before retry number `attempt` (0-based).
///
/// `min(base_delay * 2^attempt + jitter, max_delay)` with jitter drawn
/// uniformly from 0-25% of the exponential term.
#[must_use]
pub fn delay_for_attempt(policy: &RetryPolicy, attempt: u32) -> Duration {
    let base = policy
        .base_delay
        .saturating_mul(2u32.saturating_pow(attempt));
    let base = base.min(policy.max_delay);

    let jitter_fraction: f64 = rand::thread_rng().gen_range(0.0..0.25);
    let jitter = base.mul_f64(jitter_fraction);

    (base + jitter).min(policy.max_delay)
}

/// Run `op` until it succeeds, fails permanently, or the policy is exhausted.
///
/// Only errors for which [`crate::Error::is_transient`] holds are retried.
/// A server-provided retry-after acts as a lower bound for the next wait,
/// and waits never shrink from one attempt to the next.
///
/// # Errors
///
/// Returns the last error once retries are exhausted, or the first
/// permanent error immediately.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    let mut previous = Duration::ZERO;

    loop {
        match op().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::debug!(operation, retries = attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                let mut delay = delay_for_attempt(policy, attempt);
                if let Some(requested) = e.retry_after() {
                    delay = delay.max(requested.min(policy.max_delay));
                }
                delay = delay.max(previous);
                previous = delay;

                tracing::warn!(
                    operation,
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "transient failure, retrying"
                );

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
