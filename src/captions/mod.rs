/// Caption cues and the sources that supply them
///
/// Fetching captions from a video host is left to collaborators; this module
/// defines the contract plus two local sources (a caption directory and an
/// in-memory map).
pub mod srt;

use crate::error::{ClipError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A single caption entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    /// Start of the cue in seconds
    #[serde(rename = "start", alias = "startSeconds", deserialize_with = "seconds")]
    pub start_seconds: f64,
    /// Caption text
    pub text: String,
}

impl Cue {
    pub fn new(start_seconds: f64, text: &str) -> Self {
        Self {
            start_seconds,
            text: text.to_string(),
        }
    }
}

/// Caption scrapers emit start times as strings ("12.34"), others as numbers
#[derive(Deserialize)]
#[serde(untagged)]
enum Seconds {
    Number(f64),
    Text(String),
}

fn seconds<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<f64, D::Error> {
    match Seconds::deserialize(deserializer)? {
        Seconds::Number(n) => Ok(n),
        Seconds::Text(s) => s.trim().parse::<f64>().map_err(serde::de::Error::custom),
    }
}

/// Parse a JSON array of cues
pub fn parse_cues_json(content: &str) -> std::result::Result<Vec<Cue>, serde_json::Error> {
    serde_json::from_str(content)
}

/// Drop cues without a usable start time and restore start order
pub fn prepare_cues(mut cues: Vec<Cue>) -> Vec<Cue> {
    let total = cues.len();
    cues.retain(|c| c.start_seconds.is_finite() && c.start_seconds >= 0.0);
    if cues.len() < total {
        warn!("Dropped {} cues with invalid start times", total - cues.len());
    }

    if !cues.windows(2).all(|w| w[0].start_seconds <= w[1].start_seconds) {
        debug!("Caption cues out of order, sorting by start time");
        cues.sort_by(|a, b| a.start_seconds.total_cmp(&b.start_seconds));
    }

    cues
}

/// Supplies the caption cues of a video
#[async_trait]
pub trait CaptionSource: Send + Sync {
    async fn fetch_cues(&self, video_id: &str) -> Result<Vec<Cue>>;
}

/// Reject blank ids and anything that could escape a caption directory
pub fn validate_video_id(video_id: &str) -> Result<()> {
    let id = video_id.trim();
    if id.is_empty() {
        return Err(ClipError::InvalidRequest("video id must not be empty".to_string()));
    }
    if id.contains(['/', '\\']) || id.contains("..") {
        return Err(ClipError::InvalidRequest(format!(
            "video id '{}' contains path separators",
            video_id
        )));
    }
    Ok(())
}

/// Reads `<dir>/<video_id>.json` (cue array) or `<dir>/<video_id>.srt`
#[derive(Debug, Clone)]
pub struct DirectoryCaptionSource {
    captions_dir: PathBuf,
}

impl DirectoryCaptionSource {
    pub fn new<P: AsRef<Path>>(captions_dir: P) -> Self {
        Self {
            captions_dir: captions_dir.as_ref().to_path_buf(),
        }
    }

    pub fn captions_dir(&self) -> &Path {
        &self.captions_dir
    }

    fn unavailable(video_id: &str, reason: String) -> ClipError {
        ClipError::CaptionsUnavailable {
            video_id: video_id.to_string(),
            reason,
        }
    }
}

#[async_trait]
impl CaptionSource for DirectoryCaptionSource {
    async fn fetch_cues(&self, video_id: &str) -> Result<Vec<Cue>> {
        validate_video_id(video_id)?;
        let video_id = video_id.trim();

        let json_path = self.captions_dir.join(format!("{}.json", video_id));
        if tokio::fs::try_exists(&json_path).await.unwrap_or(false) {
            let content = tokio::fs::read_to_string(&json_path)
                .await
                .map_err(|e| Self::unavailable(video_id, format!("{}: {}", json_path.display(), e)))?;
            let cues = parse_cues_json(&content)
                .map_err(|e| Self::unavailable(video_id, format!("{}: {}", json_path.display(), e)))?;
            info!("📄 Loaded {} cues from {}", cues.len(), json_path.display());
            return Ok(cues);
        }

        let srt_path = self.captions_dir.join(format!("{}.srt", video_id));
        if tokio::fs::try_exists(&srt_path).await.unwrap_or(false) {
            let content = tokio::fs::read_to_string(&srt_path)
                .await
                .map_err(|e| Self::unavailable(video_id, format!("{}: {}", srt_path.display(), e)))?;
            let cues = srt::parse_srt(&content)
                .map_err(|e| Self::unavailable(video_id, format!("{}: {}", srt_path.display(), e)))?;
            info!("📄 Loaded {} cues from {}", cues.len(), srt_path.display());
            return Ok(cues);
        }

        Err(Self::unavailable(
            video_id,
            format!("no .json or .srt captions in {}", self.captions_dir.display()),
        ))
    }
}

/// Map-backed caption source
#[derive(Debug, Clone, Default)]
pub struct InMemoryCaptionSource {
    tracks: HashMap<String, Vec<Cue>>,
}

impl InMemoryCaptionSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_track(mut self, video_id: &str, cues: Vec<Cue>) -> Self {
        self.tracks.insert(video_id.to_string(), cues);
        self
    }
}

#[async_trait]
impl CaptionSource for InMemoryCaptionSource {
    async fn fetch_cues(&self, video_id: &str) -> Result<Vec<Cue>> {
        validate_video_id(video_id)?;
        self.tracks
            .get(video_id.trim())
            .cloned()
            .ok_or_else(|| ClipError::CaptionsUnavailable {
                video_id: video_id.to_string(),
                reason: "no caption track registered".to_string(),
            })
    }
}
