use std::time::Duration;

use super::CompletionBackend;
use crate::error::CompletionError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_millis(8000),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, where `attempt` counts from 1.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Retries retryable failures of `inner` with exponential backoff.
pub struct RetryingBackend<B> {
    inner: B,
    policy: RetryPolicy,
}

impl<B: CompletionBackend> RetryingBackend<B> {
    pub fn new(inner: B, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }
}

impl<B: CompletionBackend> CompletionBackend for RetryingBackend<B> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn complete(&self, system: &str, user: &str) -> Result<String, CompletionError> {
        let attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.inner.complete(system, user) {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let wait = self.policy.backoff(attempt);
                    tracing::warn!(
                        backend = self.inner.name(),
                        attempt,
                        max_attempts = attempts,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "completion failed, retrying"
                    );
                    std::thread::sleep(wait);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
