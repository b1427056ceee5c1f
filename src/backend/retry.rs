//! Transient-error retry wrapper.
//!
//! Retry is a property of the wrapper instance: sessions built from one
//! factory share exactly one layer, so retries never compound.
use super::{BackendError, GenerateRequest, GenerateResponse, ModelBackend};
use std::time::Duration;

/// Status codes retried by default: rate limited and unavailable.
pub const DEFAULT_RETRY_STATUSES: [u16; 2] = [429, 503];

/// Bounded exponential backoff on listed status codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub retry_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            retry_statuses: DEFAULT_RETRY_STATUSES.to_vec(),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Only status errors on the list qualify; malformed output never does.
    pub fn is_retryable(&self, err: &BackendError) -> bool {
        err.status_code()
            .is_some_and(|status| self.retry_statuses.contains(&status))
    }

    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let multiplier = 2u32.pow(attempt.min(5));
        self.base_delay.saturating_mul(multiplier)
    }
}

/// Wraps a backend and retries transient failures.
pub struct RetryingBackend<B> {
    inner: B,
    policy: RetryPolicy,
}

impl<B: ModelBackend> RetryingBackend<B> {
    pub fn new(inner: B, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

impl<B: ModelBackend> ModelBackend for RetryingBackend<B> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn generate(&self, request: &GenerateRequest<'_>) -> Result<GenerateResponse, BackendError> {
        let mut attempt = 0;
        loop {
            match self.inner.generate(request) {
                Ok(response) => {
                    if attempt > 0 {
                        tracing::info!(backend = self.inner.name(), attempt, "retry succeeded");
                    }
                    return Ok(response);
                }
                Err(err) => {
                    if !self.policy.is_retryable(&err) || attempt >= self.policy.max_retries {
                        return Err(err);
                    }
                    let delay = self.policy.backoff_delay(attempt);
                    attempt += 1;
                    tracing::warn!(
                        backend = self.inner.name(),
                        attempt,
                        max_retries = self.policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient backend error; retrying"
                    );
                    std::thread::sleep(delay);
                }
            }
        }
    }
}
