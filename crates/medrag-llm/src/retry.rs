//! Bounded exponential backoff shared by every provider call site.

use std::future::Future;
use std::time::Duration;

/// How a failed attempt should be treated by [`with_retry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Try again. `after` overrides the computed backoff when the provider sent a hint.
    Retry { after: Option<Duration> },
    /// Surface the error immediately.
    Fatal,
}

/// Error types that know whether they are worth retrying.
pub trait Classify {
    fn classify(&self) -> RetryClass;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Backoff before retry number `attempt + 1`, capped at `max_delay`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

/// Parse a `Retry-After` header expressed in whole seconds.
pub(crate) fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    let val = response.headers().get(reqwest::header::RETRY_AFTER)?;
    let secs = val.to_str().ok()?.trim().parse::<u64>().ok()?;
    Some(Duration::from_secs(secs))
}

/// Run `f` until it succeeds, fails with a fatal error, or `policy.max_retries`
/// retries have been spent.
///
/// Provider hints (`Retry-After`) are honoured but never exceed `max_delay`.
///
/// # Errors
///
/// Returns the last error produced by `f`.
pub async fn with_retry<T, E, F, Fut>(
    operation: &str,
    policy: RetryPolicy,
    mut f: F,
) -> Result<T, E>
where
    E: Classify + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let RetryClass::Retry { after } = err.classify() else {
                    return Err(err);
                };
                if attempt >= policy.max_retries {
                    tracing::warn!(operation, attempts = attempt + 1, "giving up: {err}");
                    return Err(err);
                }
                let delay = after.map_or_else(
                    || policy.backoff(attempt),
                    |hint| hint.min(policy.max_delay),
                );
                tracing::warn!(
                    operation,
                    retry = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "retrying after error: {err}"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Bound a provider call by `limit`. An elapsed timeout is reported as
/// [`LlmError::Transient`](crate::LlmError::Transient).
///
/// # Errors
///
/// Returns the error of `fut`, or a transient error on timeout.
pub async fn with_timeout<T, Fut>(
    operation: &str,
    limit: Duration,
    fut: Fut,
) -> Result<T, crate::LlmError>
where
    Fut: Future<Output = Result<T, crate::LlmError>>,
{
    if let Ok(result) = tokio::time::timeout(limit, fut).await {
        result
    } else {
        tracing::warn!(
            operation,
            timeout_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            "provider call timed out"
        );
        Err(crate::LlmError::Transient(format!(
            "{operation} timed out after {}s",
            limit.as_secs()
        )))
    }
}
