//! Clip extraction pipeline
//!
//! cues → annotated transcript → chunks → per-chunk extraction (oracle)
//! → optional refinement pass → consolidation (oracle) → local range reduction.

pub mod consolidation;
pub mod extraction;

use crate::captions::{prepare_cues, validate_video_id, CaptionSource, Cue};
use crate::config::PipelineConfig;
use crate::error::{ClipError, Result};
use crate::llm::{ChatMessage, PromptSet, LLM};
use crate::ranges::{reduce_ranges, ReducedRangeSet};
use crate::transcript::format_transcript;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// What the oracle is asked to look for
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionMode {
    /// Passages discussing a topic
    Topic(String),
    /// Passages interesting enough for a short clip
    Highlights,
}

impl ExtractionMode {
    /// Topic mode, rejecting blank topics
    pub fn topic(topic: &str) -> Result<Self> {
        let mode = ExtractionMode::Topic(topic.trim().to_string());
        mode.validate()?;
        Ok(mode)
    }

    fn validate(&self) -> Result<()> {
        match self {
            ExtractionMode::Topic(topic) if topic.trim().is_empty() => Err(
                ClipError::InvalidRequest("please enter a valid topic".to_string()),
            ),
            _ => Ok(()),
        }
    }

    /// Characters of the request that share the prompt budget with the chunk
    pub fn topic_chars(&self) -> usize {
        match self {
            ExtractionMode::Topic(topic) => topic.chars().count(),
            ExtractionMode::Highlights => 0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ExtractionMode::Topic(_) => "topic",
            ExtractionMode::Highlights => "highlights",
        }
    }
}

/// One oracle round trip, bounded by a timeout and raced against cancellation
pub(crate) struct OracleCall<'a> {
    llm: &'a dyn LLM,
    temperature: f32,
    timeout: Duration,
    cancel: &'a CancellationToken,
}

impl OracleCall<'_> {
    pub(crate) async fn ask(&self, messages: Vec<ChatMessage>) -> Result<String> {
        if self.cancel.is_cancelled() {
            return Err(ClipError::Cancelled);
        }

        let call = tokio::time::timeout(self.timeout, self.llm.chat(messages, self.temperature));
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ClipError::Cancelled),
            result = call => match result {
                Ok(response) => {
                    let response = response?;
                    debug!("Oracle replied with {} chars (tokens: {:?})", response.content.len(), response.tokens_used);
                    Ok(response.content)
                }
                Err(_) => Err(ClipError::OracleTimeout {
                    timeout_seconds: self.timeout.as_secs(),
                }),
            },
        }
    }
}

/// Finds clip ranges in a video's transcript with the help of an analysis oracle.
///
/// The oracle and caption source are owned by the caller and shared through
/// `Arc`, so one pipeline can serve concurrent requests.
pub struct ClipPipeline {
    llm: Arc<dyn LLM>,
    captions: Arc<dyn CaptionSource>,
    config: PipelineConfig,
    prompts: PromptSet,
    temperature: f32,
}

impl ClipPipeline {
    pub fn new(
        llm: Arc<dyn LLM>,
        captions: Arc<dyn CaptionSource>,
        config: PipelineConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            llm,
            captions,
            config,
            prompts: PromptSet::default(),
            temperature: crate::llm::LLMConfig::default().temperature,
        })
    }

    pub fn with_prompts(mut self, prompts: PromptSet) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Ranges where `topic` is discussed; no minimum duration beyond the merge gap by default
    pub async fn extract_by_topic(&self, video_id: &str, topic: &str) -> Result<ReducedRangeSet> {
        let mode = ExtractionMode::topic(topic)?;
        self.run(video_id, mode, &CancellationToken::new()).await
    }

    /// Ranges worth a short clip, at least `highlight_min_duration_seconds` long
    pub async fn extract_highlights(&self, video_id: &str) -> Result<ReducedRangeSet> {
        self.run(video_id, ExtractionMode::Highlights, &CancellationToken::new())
            .await
    }

    /// Fetch captions for `video_id` and run the pipeline, stopping when `cancel` fires
    pub async fn run(
        &self,
        video_id: &str,
        mode: ExtractionMode,
        cancel: &CancellationToken,
    ) -> Result<ReducedRangeSet> {
        validate_video_id(video_id)?;
        mode.validate()?;

        let cues = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClipError::Cancelled),
            cues = self.captions.fetch_cues(video_id) => cues?,
        };

        info!("🎬 Searching {} ({} mode, {} cues)", video_id, mode.label(), cues.len());
        self.run_on_cues(cues, mode, cancel).await
    }

    /// Run the pipeline over cues supplied by the caller
    pub async fn run_on_cues(
        &self,
        cues: Vec<Cue>,
        mode: ExtractionMode,
        cancel: &CancellationToken,
    ) -> Result<ReducedRangeSet> {
        mode.validate()?;
        let started = Instant::now();

        let cues = prepare_cues(cues);
        let transcript = format_transcript(&cues)?;
        let max_length = self.config.chunk_length(&mode)?;

        let oracle = OracleCall {
            llm: self.llm.as_ref(),
            temperature: self.temperature,
            timeout: Duration::from_secs(self.config.call_timeout_seconds),
            cancel,
        };

        let snippets = extraction::extract_snippets(
            &oracle,
            &self.prompts,
            &mode,
            &transcript,
            max_length,
            &self.config,
        )
        .await?;

        if snippets.trim().is_empty() {
            info!("🔍 No matching passages found, skipping consolidation");
            return Ok(Vec::new());
        }

        let raw = consolidation::consolidate(
            &oracle,
            &self.prompts,
            &mode,
            &snippets,
            &self.config.consolidation_hints(),
        )
        .await?;

        let ranges = reduce_ranges(raw, &self.config.reducer_policy(&mode))?;
        info!(
            "✅ Found {} ranges in {:.2}s",
            ranges.len(),
            started.elapsed().as_secs_f64()
        );
        Ok(ranges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_mode_rejects_blank_topic() {
        assert_eq!(ExtractionMode::topic("   ").unwrap_err().kind(), "invalid_request");
        assert_eq!(
            ExtractionMode::topic(" sleep ").unwrap(),
            ExtractionMode::Topic("sleep".to_string())
        );
    }

    #[test]
    fn test_topic_chars_counts_characters() {
        assert_eq!(ExtractionMode::Topic("café".to_string()).topic_chars(), 4);
        assert_eq!(ExtractionMode::Highlights.topic_chars(), 0);
    }
}
