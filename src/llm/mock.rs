use super::{ChatMessage, LLMProvider, LLMResponse, LLM};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

type Responder = dyn Fn(&[ChatMessage]) -> Result<String> + Send + Sync;
type Latency = dyn Fn(&[ChatMessage]) -> Duration + Send + Sync;

/// Scripted oracle for tests and offline runs.
///
/// Every call is answered by the responder closure and recorded, so tests can
/// assert on prompts, call counts and peak concurrency.
pub struct ScriptedLLM {
    responder: Box<Responder>,
    latency: Option<Box<Latency>>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    provider_type: LLMProvider,
}

impl ScriptedLLM {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&[ChatMessage]) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            latency: None,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            provider_type: LLMProvider::LMStudio,
        }
    }

    /// Answers every prompt with the content of its last user message
    pub fn echo() -> Self {
        Self::new(|messages| {
            Ok(messages
                .iter()
                .rev()
                .find(|m| m.role == "user")
                .map(|m| m.content.clone())
                .unwrap_or_default())
        })
    }

    /// Delay every reply by a fixed duration
    pub fn with_latency(self, latency: Duration) -> Self {
        self.with_latency_fn(move |_| latency)
    }

    /// Delay each reply by a duration chosen from its prompt
    pub fn with_latency_fn<F>(mut self, latency: F) -> Self
    where
        F: Fn(&[ChatMessage]) -> Duration + Send + Sync + 'static,
    {
        self.latency = Some(Box::new(latency));
        self
    }

    pub fn with_provider_type(mut self, provider_type: LLMProvider) -> Self {
        self.provider_type = provider_type;
        self
    }

    /// Prompts received so far, in call order
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Highest number of calls that were awaiting a reply at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

/// Releases an in-flight slot even when the call is dropped mid-sleep
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl LLM for ScriptedLLM {
    async fn chat(&self, messages: Vec<ChatMessage>, _temperature: f32) -> Result<LLMResponse> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(messages.clone());

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        let in_flight = InFlight(&self.in_flight);

        if let Some(latency) = &self.latency {
            tokio::time::sleep(latency(&messages)).await;
        }
        drop(in_flight);

        let content = (self.responder)(&messages)?;
        Ok(LLMResponse {
            content,
            tokens_used: None,
        })
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn provider_type(&self) -> LLMProvider {
        self.provider_type.clone()
    }
}
