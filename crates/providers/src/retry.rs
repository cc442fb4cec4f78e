//! Retry wrapper — bounded retry with exponential backoff.
//!
//! Transient provider failures (rate limits, network hiccups) are retried a
//! bounded number of times before the error propagates and fails the turn.
//! Non-transient errors propagate immediately.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use threadline_core::error::ProviderError;
use threadline_core::provider::*;
use tracing::warn;

/// A provider that wraps another provider and retries transient failures.
pub struct RetryProvider {
    inner: Arc<dyn Provider>,
    max_attempts: u32,
    base_backoff: Duration,
}

impl RetryProvider {
    /// Wrap `inner` with the default policy: 3 attempts, 500ms base backoff.
    pub fn new(inner: Arc<dyn Provider>) -> Self {
        Self {
            inner,
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
        }
    }

    /// Set the maximum number of attempts (including the first).
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set the base backoff duration; doubles after each failed attempt.
    pub fn with_base_backoff(mut self, backoff: Duration) -> Self {
        self.base_backoff = backoff;
        self
    }

    async fn backoff(&self, attempt: u32, error: &ProviderError) {
        let delay = self.base_backoff * 2u32.saturating_pow(attempt - 1);
        warn!(
            provider = %self.inner.name(),
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Transient provider error, backing off"
        );
        tokio::time::sleep(delay).await;
    }
}

#[async_trait]
impl Provider for RetryProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<CompletionResponse, ProviderError> {
        let mut attempt = 1;
        loop {
            match self.inner.complete(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    self.backoff(attempt, &e).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<DeltaFragment, ProviderError>>,
        ProviderError,
    > {
        // Retry covers establishing the stream; once fragments are flowing,
        // an interruption is not retryable (the turn would see duplicates).
        let mut attempt = 1;
        loop {
            match self.inner.stream(request.clone()).await {
                Ok(rx) => return Ok(rx),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    self.backoff(attempt, &e).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
