//! Retry with exponential backoff for unreliable external calls.
//!
//! Two policies:
//! - **RetryPolicy**: `min(base * 2^attempt, max)` between attempts, with a
//!   caller-supplied classifier deciding which errors are worth retrying.
//! - **RateLimitBackoff**: the ads-platform throttle policy,
//!   `2^retry * 60s + jitter(0..10s)` for at most five retries.

use std::future::Future;
use std::time::Duration;

use campflow_types::config::RetrySettings;
use campflow_types::error::{CallError, is_transient_message};
use rand::Rng;

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Exponential backoff parameters. `max_attempts` counts the first call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` is clamped to at least one.
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(
            settings.max_attempts,
            Duration::from_millis(settings.base_delay_ms),
            Duration::from_millis(settings.max_delay_ms),
        )
    }

    /// Delay before retrying after zero-indexed `attempt` failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}

/// Default classifier: textual heuristic over the error description.
pub fn is_transient<E: std::fmt::Display>(error: &E) -> bool {
    is_transient_message(&error.to_string())
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// attempt budget runs out.
///
/// `op` receives the zero-indexed attempt number. `on_retry` is invoked with
/// the error and attempt number before each backoff sleep.
pub async fn retry_with_backoff<T, E, Op, Fut, C>(
    policy: &RetryPolicy,
    label: &str,
    classify: C,
    on_retry: Option<&(dyn Fn(&E, u32) + Send + Sync)>,
    mut op: Op,
) -> Result<T, RetryError<E>>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        let error = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if !classify(&error) {
            tracing::debug!(label, attempt, error = %error, "non-retryable error");
            return Err(RetryError::Fatal(error));
        }

        if attempt + 1 >= policy.max_attempts {
            tracing::warn!(
                label,
                attempts = policy.max_attempts,
                error = %error,
                "retry budget exhausted"
            );
            return Err(RetryError::Exhausted {
                label: label.to_string(),
                attempts: policy.max_attempts,
                source: error,
            });
        }

        let delay = policy.delay_for(attempt);
        tracing::warn!(
            label,
            attempt = attempt + 1,
            max_attempts = policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "transient error, retrying"
        );
        if let Some(callback) = on_retry {
            callback(&error, attempt);
        }
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// [`retry_with_backoff`] specialised to external calls and [`CallError::is_retryable`].
pub async fn retry_call<T, Op, Fut>(
    policy: &RetryPolicy,
    label: &str,
    op: Op,
) -> Result<T, RetryError<CallError>>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, CallError>>,
{
    retry_with_backoff(policy, label, CallError::is_retryable, None, op).await
}

/// Bound a call by `limit`; elapsed time becomes a retryable [`CallError::Timeout`].
pub async fn call_with_timeout<T, F>(limit: Duration, call: F) -> Result<T, CallError>
where
    F: Future<Output = Result<T, CallError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(CallError::Timeout(limit.as_millis() as u64)),
    }
}

// ---------------------------------------------------------------------------
// RateLimitBackoff
// ---------------------------------------------------------------------------

/// Throttle policy for the ads-platform publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitBackoff {
    pub max_retries: u32,
    pub unit: Duration,
    pub max_jitter: Duration,
}

impl Default for RateLimitBackoff {
    fn default() -> Self {
        Self {
            max_retries: 5,
            unit: Duration::from_secs(60),
            max_jitter: Duration::from_secs(10),
        }
    }
}

impl RateLimitBackoff {
    /// `2^retry_count * unit + jitter`.
    pub fn delay_for(&self, retry_count: u32, jitter: Duration) -> Duration {
        let factor = 2u32.checked_pow(retry_count).unwrap_or(u32::MAX);
        self.unit.saturating_mul(factor).saturating_add(jitter)
    }

    fn jittered_delay(&self, retry_count: u32) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        let jitter_ms = if max_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=max_ms)
        };
        self.delay_for(retry_count, Duration::from_millis(jitter_ms))
    }

    /// Run `op`, sleeping through rate limits. Other errors pass through untouched.
    ///
    /// After `max_retries` throttled retries the call fails with
    /// [`CallError::RateLimitExhausted`].
    pub async fn run<T, Op, Fut>(&self, label: &str, mut op: Op) -> Result<T, CallError>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let mut retry_count = 0;
        loop {
            match op().await {
                Err(CallError::RateLimited { .. }) => {
                    if retry_count >= self.max_retries {
                        tracing::error!(label, retries = retry_count, "rate limit retries exhausted");
                        return Err(CallError::RateLimitExhausted(self.max_retries));
                    }
                    let delay = self.jittered_delay(retry_count);
                    tracing::warn!(
                        label,
                        retry = retry_count + 1,
                        max_retries = self.max_retries,
                        delay_secs = delay.as_secs(),
                        "rate limited, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                }
                other => return other,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Terminal outcome of a retried operation.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error.
    #[error("{label} failed after {attempts} attempts: {source}")]
    Exhausted {
        label: String,
        attempts: u32,
        source: E,
    },

    /// The first non-retryable error, surfaced immediately.
    #[error("{0}")]
    Fatal(E),
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { source, .. } => source,
            RetryError::Fatal(error) => error,
        }
    }

    pub fn inner(&self) -> &E {
        match self {
            RetryError::Exhausted { source, .. } => source,
            RetryError::Fatal(error) => error,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
