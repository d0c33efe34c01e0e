//! Transcript Clipper
//!
//! Finds timestamp ranges in podcast transcripts, either where a topic is
//! discussed or where the conversation is worth a short highlight clip.
//! The heavy lifting is delegated to an analysis oracle (a chat-completions
//! LLM); this crate formats and chunks the transcript, fans the chunks out
//! with bounded concurrency, and turns the oracle's answers into a clean,
//! sorted, non-overlapping set of ranges.

pub mod captions;
pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod ranges;
pub mod transcript;

// Re-export main types for easy access
pub use crate::captions::{CaptionSource, Cue, DirectoryCaptionSource, InMemoryCaptionSource};
pub use crate::config::{Config, ConfigBuilder, PipelineConfig};
pub use crate::error::{ClipError, ErrorReport, Result};
pub use crate::llm::{create_llm, LLMConfig, LLMProvider, PromptSet, ScriptedLLM, LLM};
pub use crate::pipeline::{ClipPipeline, ExtractionMode};
pub use crate::ranges::{reduce_ranges, ReducedRangeSet, ReducerPolicy, SpanEnd, TimeRange};
pub use crate::transcript::{chunk_transcript, format_transcript};
