use super::{ChatMessage, LLMProvider, LLMResponse, LLM};
use crate::error::{ClipError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Longest wait honoured from a rate-limit hint
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Caller-side retry policy around an oracle client.
///
/// Only retryable errors (unavailable, rate limited, timed out) are retried,
/// with exponential backoff starting at `base_backoff`. A rate-limit reply that
/// carries `Retry-After` waits that long instead.
pub struct RetryingLLM {
    inner: Arc<dyn LLM>,
    max_retries: u32,
    base_backoff: Duration,
}

impl RetryingLLM {
    pub fn new(inner: Arc<dyn LLM>, max_retries: u32, base_backoff: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_backoff,
        }
    }

    fn delay_for(&self, attempt: u32, err: &ClipError) -> Duration {
        if let ClipError::OracleRateLimited {
            retry_after_seconds: Some(seconds),
            ..
        } = err
        {
            return Duration::from_secs(*seconds).min(MAX_RETRY_AFTER);
        }
        self.base_backoff.saturating_mul(2u32.saturating_pow(attempt))
    }
}

#[async_trait]
impl LLM for RetryingLLM {
    async fn chat(&self, messages: Vec<ChatMessage>, temperature: f32) -> Result<LLMResponse> {
        let mut attempt = 0;
        loop {
            match self.inner.chat(messages.clone(), temperature).await {
                Ok(response) => return Ok(response),
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    let delay = self.delay_for(attempt, &err);
                    attempt += 1;
                    warn!(
                        "Oracle call failed ({}), retry {}/{} in {:?}",
                        err, attempt, self.max_retries, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn is_available(&self) -> bool {
        self.inner.is_available().await
    }

    fn provider_type(&self) -> LLMProvider {
        self.inner.provider_type()
    }
}
