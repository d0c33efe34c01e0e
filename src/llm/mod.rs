pub mod mock;
pub mod prompts;
pub mod providers;
pub mod retry;

pub use mock::ScriptedLLM;
pub use prompts::PromptSet;
pub use retry::RetryingLLM;

use crate::error::{ClipError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// LLM provider types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum LLMProvider {
    OpenAI,
    LMStudio,
    Gemini,
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LLMConfig {
    /// Provider to talk to
    pub provider: LLMProvider,
    /// Chat endpoint override (required for LMStudio)
    pub endpoint: Option<String>,
    /// API key (cloud providers)
    pub api_key: Option<String>,
    /// Model name
    pub model: String,
    /// Maximum tokens to generate per reply
    pub max_tokens: u32,
    /// Sampling temperature used by the pipeline
    pub temperature: f32,
    /// HTTP request timeout in seconds
    pub timeout_seconds: u64,
    /// Caller-side retries per oracle call (0 = no retry wrapper)
    pub max_retries: u32,
    /// Base backoff between retries in milliseconds
    pub retry_backoff_ms: u64,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::OpenAI,
            endpoint: None,
            api_key: None,
            model: "gpt-3.5-turbo".to_string(),
            max_tokens: 1024,
            temperature: 0.6,
            timeout_seconds: 60,
            max_retries: 0,
            retry_backoff_ms: 500,
        }
    }
}

/// Chat message for LLM communication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// LLM response
#[derive(Debug, Clone)]
pub struct LLMResponse {
    pub content: String,
    pub tokens_used: Option<u32>,
}

/// The analysis oracle: prompt in, best-effort text out
#[async_trait]
pub trait LLM: Send + Sync {
    async fn chat(&self, messages: Vec<ChatMessage>, temperature: f32) -> Result<LLMResponse>;
    async fn is_available(&self) -> bool;
    fn provider_type(&self) -> LLMProvider;
}

/// Create LLM instance based on configuration, wrapped in a retry policy when configured
pub fn create_llm(config: &LLMConfig) -> Result<Arc<dyn LLM>> {
    let provider: Arc<dyn LLM> = match config.provider {
        LLMProvider::OpenAI | LLMProvider::LMStudio => {
            Arc::new(providers::ChatCompletionsProvider::new(config.clone())?)
        }
        LLMProvider::Gemini => Arc::new(providers::GeminiProvider::new(config.clone())?),
    };

    if config.max_retries == 0 {
        return Ok(provider);
    }

    Ok(Arc::new(RetryingLLM::new(
        provider,
        config.max_retries,
        std::time::Duration::from_millis(config.retry_backoff_ms),
    )))
}

impl LLMConfig {
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(ClipError::InvalidConfig("llm.model must not be empty".to_string()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ClipError::InvalidConfig(format!(
                "llm.temperature must be within 0.0..=2.0, got {}",
                self.temperature
            )));
        }
        if self.timeout_seconds == 0 {
            return Err(ClipError::InvalidConfig(
                "llm.timeout_seconds must be greater than 0".to_string(),
            ));
        }
        match self.provider {
            LLMProvider::OpenAI | LLMProvider::Gemini if self.api_key.is_none() => Err(
                ClipError::InvalidConfig(format!("{:?} API key required", self.provider)),
            ),
            LLMProvider::LMStudio if self.endpoint.is_none() => Err(ClipError::InvalidConfig(
                "LMStudio endpoint not configured".to_string(),
            )),
            _ => Ok(()),
        }
    }
}
