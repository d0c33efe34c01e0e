//! System instructions and message builders for each oracle stage

use super::ChatMessage;
use crate::error::Result;
use crate::pipeline::ExtractionMode;
use std::path::Path;
use tracing::{info, warn};

pub const TOPIC_EXTRACTION_PROMPT: &str = "You find passages in one chunk of a timestamped podcast transcript. \
Every passage in the transcript is written as \"start-end: text\". You are given a topic and return every \
passage in the chunk where the topic is discussed, copied with its timestamp annotation intact. \
Answer with the passages only, without any introduction or commentary. \
If the chunk never discusses the topic, answer with an empty string.";

pub const HIGHLIGHT_EXTRACTION_PROMPT: &str = "You pick highlights from one chunk of a timestamped podcast transcript. \
Every passage in the transcript is written as \"start-end: text\". Return the passages that would stand on their own \
as a short, engaging clip: a surprising claim, a funny exchange, a clear insight or a strong story. \
Copy each passage with its timestamp annotation intact. Answer with the passages only, without any introduction \
or commentary. If nothing in the chunk is worth clipping, answer with an empty string.";

pub const REFINEMENT_PROMPT: &str = "You filter snippets that were already extracted from a timestamped podcast \
transcript. Every snippet is written as \"start-end: text\". Keep only the snippets that match the request, \
copied with their timestamp annotations intact, and drop the rest. Answer with the snippets only, without any \
introduction or commentary. If none match, answer with an empty string.";

pub const CONSOLIDATION_PROMPT: &str = "You convert timestamped transcript snippets into clip ranges. \
Reply with a JSON array and nothing else.";

const EXTRACTION_FILE: &str = "extraction.txt";
const HIGHLIGHTS_FILE: &str = "highlights.txt";
const REFINEMENT_FILE: &str = "refinement.txt";
const CONSOLIDATION_FILE: &str = "consolidation.txt";

/// Best-effort merge instructions embedded in the consolidation prompt
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsolidationHints {
    pub merge_gap_seconds: f64,
    pub min_duration_seconds: f64,
}

/// System instructions for every oracle stage
#[derive(Debug, Clone, PartialEq)]
pub struct PromptSet {
    pub topic_extraction: String,
    pub highlight_extraction: String,
    pub refinement: String,
    pub consolidation: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            topic_extraction: TOPIC_EXTRACTION_PROMPT.to_string(),
            highlight_extraction: HIGHLIGHT_EXTRACTION_PROMPT.to_string(),
            refinement: REFINEMENT_PROMPT.to_string(),
            consolidation: CONSOLIDATION_PROMPT.to_string(),
        }
    }
}

impl PromptSet {
    /// Built-in prompts, overridden by any prompt file present in `dir`
    pub async fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let mut prompts = Self::default();

        let slots: [(&str, &mut String); 4] = [
            (EXTRACTION_FILE, &mut prompts.topic_extraction),
            (HIGHLIGHTS_FILE, &mut prompts.highlight_extraction),
            (REFINEMENT_FILE, &mut prompts.refinement),
            (CONSOLIDATION_FILE, &mut prompts.consolidation),
        ];

        for (file, slot) in slots {
            let path = dir.join(file);
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                continue;
            }
            let content = tokio::fs::read_to_string(&path).await?;
            let content = content.trim();
            if content.is_empty() {
                warn!("Prompt file {} is empty, keeping built-in prompt", path.display());
                continue;
            }
            info!("📝 Loaded prompt override from {}", path.display());
            *slot = content.to_string();
        }

        Ok(prompts)
    }

    /// First-pass prompt for one transcript chunk
    pub fn extraction_messages(&self, mode: &ExtractionMode, chunk: &str) -> Vec<ChatMessage> {
        match mode {
            ExtractionMode::Topic(topic) => vec![
                ChatMessage::system(self.topic_extraction.as_str()),
                ChatMessage::user(format!(
                    "Find the passages in the following transcript where '{}' is discussed. \
                     The transcript is formatted as \"startTime-endTime: text\"; keep that formatting \
                     so every passage stays tied to its timestamps:\n\n{}",
                    topic, chunk
                )),
            ],
            ExtractionMode::Highlights => vec![
                ChatMessage::system(self.highlight_extraction.as_str()),
                ChatMessage::user(format!(
                    "Find the passages in the following transcript that are interesting enough for a \
                     short clip. The transcript is formatted as \"startTime-endTime: text\"; keep that \
                     formatting so every passage stays tied to its timestamps:\n\n{}",
                    chunk
                )),
            ],
        }
    }

    /// Second-pass prompt re-filtering already extracted snippets
    pub fn refinement_messages(&self, mode: &ExtractionMode, snippets: &str) -> Vec<ChatMessage> {
        let request = match mode {
            ExtractionMode::Topic(topic) => format!("Which of them discuss '{}'?", topic),
            ExtractionMode::Highlights => {
                "Which of them are interesting enough for a short clip?".to_string()
            }
        };

        vec![
            ChatMessage::system(self.refinement.as_str()),
            ChatMessage::user(format!(
                "The following snippets are formatted as \"startTime-endTime: text\". {} \
                 Keep the formatting so every snippet stays tied to its timestamps:\n\n{}",
                request, snippets
            )),
        ]
    }

    /// Final prompt turning snippets into a JSON array of ranges
    pub fn consolidation_messages(
        &self,
        mode: &ExtractionMode,
        snippets: &str,
        hints: &ConsolidationHints,
    ) -> Vec<ChatMessage> {
        let subject = match mode {
            ExtractionMode::Topic(topic) => format!("discussing the topic '{}'", topic),
            ExtractionMode::Highlights => "selected as clip highlights".to_string(),
        };

        vec![
            ChatMessage::system(self.consolidation.as_str()),
            ChatMessage::user(format!(
                "Below are transcript snippets {subject}. Each one starts with a timestamp in the \
                 format \"start-end: text\", in seconds.\n\
                 For every section, report the start of its first snippet and the end of its last snippet.\n\
                 - Snippets that directly follow each other belong to the same section.\n\
                 - Sections less than {gap} seconds apart are one section.\n\
                 - Leave out sections shorter than {min} seconds.\n\
                 - The last snippet of the transcript ends in \"unknown\". A section ending with it has \
                 no known end: report it with \"end\": \"unknown\", for example {{\"start\": 45.0, \"end\": \"unknown\"}}, \
                 and always keep it.\n\
                 Reply ONLY with a JSON array of objects with a numeric \"start\" and a numeric (or \"unknown\") \"end\", \
                 for example [{{\"start\": 2564.28, \"end\": 2577.60}}].\n\n\
                 Snippets:\n{snippets}",
                subject = subject,
                gap = format_seconds(hints.merge_gap_seconds),
                min = format_seconds(hints.min_duration_seconds),
                snippets = snippets,
            )),
        ]
    }
}

/// `10` rather than `10.0` in prompts
fn format_seconds(seconds: f64) -> String {
    if seconds.fract() == 0.0 {
        format!("{}", seconds as i64)
    } else {
        format!("{}", seconds)
    }
}
