use crate::error::{ClipError, Result};
use crate::llm::prompts::ConsolidationHints;
use crate::llm::{LLMConfig, LLMProvider};
use crate::pipeline::ExtractionMode;
use crate::ranges::ReducerPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for the transcript clipper
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Analysis oracle settings
    pub llm: LLMConfig,

    /// Chunking, concurrency and range thresholds
    pub pipeline: PipelineConfig,

    /// Where captions are read from
    pub captions: CaptionConfig,

    /// Log output settings
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Character budget of one oracle prompt
    pub prompt_budget_chars: usize,

    /// Characters reserved for instructions around the chunk
    pub prompt_overhead_chars: usize,

    /// Oracle calls allowed in flight per request
    pub max_concurrent_requests: usize,

    /// Upper bound for a single oracle call (seconds)
    pub call_timeout_seconds: u64,

    /// Ranges closer than this are merged (seconds)
    pub merge_gap_seconds: f64,

    /// Minimum range length in topic mode (seconds, 0 = keep everything)
    pub topic_min_duration_seconds: f64,

    /// Minimum range length in highlight mode (seconds)
    pub highlight_min_duration_seconds: f64,

    /// Minimum length the oracle is asked to respect during consolidation
    pub prompt_min_duration_hint_seconds: f64,

    /// Run the refinement pass even when first-pass snippets fit one prompt
    pub always_refine: bool,

    /// Directory with prompt overrides
    pub prompt_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionConfig {
    /// Directory holding `<video_id>.json` / `<video_id>.srt` caption files
    pub captions_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level for this crate (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            prompt_budget_chars: 4000,
            prompt_overhead_chars: 100,
            max_concurrent_requests: 4,
            call_timeout_seconds: 90,
            merge_gap_seconds: 10.0,
            topic_min_duration_seconds: 0.0,
            highlight_min_duration_seconds: 15.0,
            prompt_min_duration_hint_seconds: 10.0,
            always_refine: false,
            prompt_dir: None,
        }
    }
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            captions_dir: PathBuf::from("captions"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn non_negative(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(ClipError::InvalidConfig(format!(
            "{} must be a non-negative number, got {}",
            name, value
        )));
    }
    Ok(())
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.prompt_overhead_chars >= self.prompt_budget_chars {
            return Err(ClipError::InvalidConfig(format!(
                "prompt_budget_chars ({}) must exceed prompt_overhead_chars ({})",
                self.prompt_budget_chars, self.prompt_overhead_chars
            )));
        }
        if self.max_concurrent_requests == 0 {
            return Err(ClipError::InvalidConfig(
                "max_concurrent_requests must be greater than 0".to_string(),
            ));
        }
        if self.call_timeout_seconds == 0 {
            return Err(ClipError::InvalidConfig(
                "call_timeout_seconds must be greater than 0".to_string(),
            ));
        }
        non_negative("merge_gap_seconds", self.merge_gap_seconds)?;
        non_negative("topic_min_duration_seconds", self.topic_min_duration_seconds)?;
        non_negative("highlight_min_duration_seconds", self.highlight_min_duration_seconds)?;
        non_negative(
            "prompt_min_duration_hint_seconds",
            self.prompt_min_duration_hint_seconds,
        )?;
        Ok(())
    }

    /// Chunk size for a request: the prompt budget minus overhead and the topic itself
    pub fn chunk_length(&self, mode: &ExtractionMode) -> Result<usize> {
        self.prompt_budget_chars
            .checked_sub(self.prompt_overhead_chars)
            .and_then(|room| room.checked_sub(mode.topic_chars()))
            .filter(|&len| len > 0)
            .ok_or_else(|| {
                ClipError::InvalidConfig(format!(
                    "topic of {} chars leaves no room in a {} char prompt",
                    mode.topic_chars(),
                    self.prompt_budget_chars
                ))
            })
    }

    /// Local merge/filter thresholds for a mode
    pub fn reducer_policy(&self, mode: &ExtractionMode) -> ReducerPolicy {
        let min_duration = match mode {
            ExtractionMode::Topic(_) => self.topic_min_duration_seconds,
            ExtractionMode::Highlights => self.highlight_min_duration_seconds,
        };
        ReducerPolicy::new(self.merge_gap_seconds, min_duration)
    }

    pub fn consolidation_hints(&self) -> ConsolidationHints {
        ConsolidationHints {
            merge_gap_seconds: self.merge_gap_seconds,
            min_duration_seconds: self.prompt_min_duration_hint_seconds,
        }
    }
}

impl Config {
    /// Load configuration from the first config file found, else from the environment
    pub fn load() -> Result<Self> {
        let config_paths = ["transcript-clipper.toml", "config/transcript-clipper.toml"];

        for path in &config_paths {
            if Path::new(path).exists() {
                return Self::load_from(path);
            }
        }

        Self::from_env()
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config_str = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&config_str).map_err(|e| {
            ClipError::InvalidConfig(format!("failed to parse {}: {}", path.display(), e))
        })?;
        tracing::info!("📄 Loaded configuration from: {}", path.display());
        Ok(config.apply_env())
    }

    /// Default configuration with environment overrides
    pub fn from_env() -> Result<Self> {
        Ok(Self::default().apply_env())
    }

    fn apply_env(mut self) -> Self {
        if let Ok(api_key) = std::env::var("CLIPPER_API_KEY").or_else(|_| std::env::var("OPENAI_API_KEY")) {
            self.llm.api_key = Some(api_key);
        }

        if let Ok(model) = std::env::var("CLIPPER_MODEL") {
            self.llm.model = model;
        }

        if let Ok(endpoint) = std::env::var("CLIPPER_ENDPOINT") {
            self.llm.endpoint = Some(endpoint);
        }

        if let Ok(level) = std::env::var("CLIPPER_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(dir) = std::env::var("CLIPPER_CAPTIONS_DIR") {
            self.captions.captions_dir = PathBuf::from(dir);
        }

        self
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let config_str = toml::to_string_pretty(self)
            .map_err(|e| ClipError::InvalidConfig(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path.as_ref(), config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path.as_ref().display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.llm.validate()?;
        self.pipeline.validate()?;
        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Transcript Clipper Configuration:\n\
            - Oracle: {:?} ({})\n\
            - Prompt budget: {} chars\n\
            - Concurrent oracle calls: {}\n\
            - Merge gap: {}s\n\
            - Highlight minimum: {}s\n\
            - Captions directory: {}",
            self.llm.provider,
            self.llm.model,
            self.pipeline.prompt_budget_chars,
            self.pipeline.max_concurrent_requests,
            self.pipeline.merge_gap_seconds,
            self.pipeline.highlight_min_duration_seconds,
            self.captions.captions_dir.display(),
        )
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_provider(mut self, provider: LLMProvider) -> Self {
        self.config.llm.provider = provider;
        self
    }

    pub fn with_api_key(mut self, api_key: String) -> Self {
        self.config.llm.api_key = Some(api_key);
        self
    }

    pub fn with_endpoint(mut self, endpoint: String) -> Self {
        self.config.llm.endpoint = Some(endpoint);
        self
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.config.llm.model = model;
        self
    }

    pub fn with_concurrency(mut self, max_concurrent_requests: usize) -> Self {
        self.config.pipeline.max_concurrent_requests = max_concurrent_requests;
        self
    }

    pub fn with_prompt_budget(mut self, chars: usize) -> Self {
        self.config.pipeline.prompt_budget_chars = chars;
        self
    }

    pub fn with_captions_dir(mut self, dir: PathBuf) -> Self {
        self.config.captions.captions_dir = dir;
        self
    }

    pub fn always_refine(mut self, enable: bool) -> Self {
        self.config.pipeline.always_refine = enable;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.pipeline.prompt_budget_chars, 4000);
        assert_eq!(config.pipeline.merge_gap_seconds, 10.0);
        assert_eq!(config.pipeline.highlight_min_duration_seconds, 15.0);
        assert_eq!(config.pipeline.topic_min_duration_seconds, 0.0);
        assert!(config.pipeline.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .with_api_key("sk-test".to_string())
            .with_concurrency(8)
            .with_prompt_budget(2000)
            .always_refine(true)
            .build();

        assert_eq!(config.pipeline.max_concurrent_requests, 8);
        assert_eq!(config.pipeline.prompt_budget_chars, 2000);
        assert!(config.pipeline.always_refine);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_chunk_length_subtracts_topic() {
        let pipeline = PipelineConfig::default();
        assert_eq!(
            pipeline.chunk_length(&ExtractionMode::Topic("sleep".to_string())).unwrap(),
            3895
        );
        assert_eq!(pipeline.chunk_length(&ExtractionMode::Highlights).unwrap(), 3900);
    }

    #[test]
    fn test_chunk_length_rejects_oversized_topic() {
        let pipeline = PipelineConfig::default();
        let topic = ExtractionMode::Topic("x".repeat(3900));
        assert_eq!(pipeline.chunk_length(&topic).unwrap_err().kind(), "invalid_config");
    }

    #[test]
    fn test_reducer_policy_per_mode() {
        let pipeline = PipelineConfig::default();
        assert_eq!(
            pipeline.reducer_policy(&ExtractionMode::Highlights),
            ReducerPolicy::new(10.0, 15.0)
        );
        assert_eq!(
            pipeline.reducer_policy(&ExtractionMode::Topic("x".to_string())),
            ReducerPolicy::new(10.0, 0.0)
        );
    }

    #[test]
    fn test_invalid_pipeline_config() {
        let mut pipeline = PipelineConfig::default();
        pipeline.max_concurrent_requests = 0;
        assert!(pipeline.validate().is_err());

        let mut pipeline = PipelineConfig::default();
        pipeline.prompt_overhead_chars = 5000;
        assert!(pipeline.validate().is_err());

        let mut pipeline = PipelineConfig::default();
        pipeline.merge_gap_seconds = -3.0;
        assert_eq!(pipeline.validate().unwrap_err().kind(), "invalid_config");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [pipeline]
            max_concurrent_requests = 2

            [llm]
            provider = "LMStudio"
            endpoint = "http://localhost:1234/v1/chat/completions"
            "#,
        )
        .unwrap();

        assert_eq!(config.pipeline.max_concurrent_requests, 2);
        assert_eq!(config.pipeline.prompt_budget_chars, 4000);
        assert_eq!(config.llm.provider, LLMProvider::LMStudio);
        assert_eq!(config.llm.model, "gpt-3.5-turbo");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("clipper.toml");

        let config = ConfigBuilder::new()
            .with_model("gpt-4o-mini".to_string())
            .with_captions_dir(PathBuf::from("/data/captions"))
            .build();
        config.save(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let reloaded: Config = toml::from_str(&content).unwrap();
        assert_eq!(reloaded.llm.model, "gpt-4o-mini");
        assert_eq!(reloaded.captions.captions_dir, PathBuf::from("/data/captions"));
    }

    #[test]
    fn test_malformed_file_is_invalid_config() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.toml");
        std::fs::write(&path, "[pipeline\nmax = ").unwrap();
        assert_eq!(Config::load_from(&path).unwrap_err().kind(), "invalid_config");
    }
}
