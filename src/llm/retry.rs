//! Timeout and bounded retry around an `LlmProvider`.
//!
//! Retries are confined to the LLM layer; the pipeline itself surfaces the
//! first error it sees.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::LlmError;
use crate::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider};

/// Base delay before the first retry; doubles per attempt.
const BASE_BACKOFF: Duration = Duration::from_millis(500);

/// Upper bound on a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(8);

/// Applies a per-attempt timeout and retries transient failures.
pub struct RetryProvider {
    inner: Arc<dyn LlmProvider>,
    max_retries: u32,
    timeout: Duration,
    base_backoff: Duration,
}

impl RetryProvider {
    pub fn new(inner: Arc<dyn LlmProvider>, max_retries: u32, timeout: Duration) -> Self {
        Self {
            inner,
            max_retries,
            timeout,
            base_backoff: BASE_BACKOFF,
        }
    }

    /// Override the base backoff (tests use zero).
    pub fn with_base_backoff(mut self, backoff: Duration) -> Self {
        self.base_backoff = backoff;
        self
    }

    fn backoff_for(&self, attempt: u32, error: &LlmError) -> Duration {
        if let LlmError::RateLimited {
            retry_after: Some(after),
            ..
        } = error
        {
            return (*after).min(MAX_BACKOFF);
        }
        self.base_backoff
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(MAX_BACKOFF)
    }

    async fn attempt(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        match tokio::time::timeout(self.timeout, self.inner.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout {
                provider: self.inner.model_name().to_string(),
                timeout: self.timeout,
            }),
        }
    }
}

#[async_trait]
impl LlmProvider for RetryProvider {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let mut attempt = 0;
        loop {
            match self.attempt(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = self.backoff_for(attempt, &e);
                    warn!(
                        model = %self.inner.model_name(),
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "LLM call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
