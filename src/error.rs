//! Error types shared by every stage of the clip pipeline

use serde::Serialize;

/// Result type for clip pipeline operations
pub type Result<T> = std::result::Result<T, ClipError>;

/// Longest slice of an oracle reply kept on a malformed-output error
const EXCERPT_LIMIT: usize = 200;

/// Error types for clip pipeline operations
#[derive(thiserror::Error, Debug)]
pub enum ClipError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("Captions unavailable for '{video_id}': {reason}")]
    CaptionsUnavailable { video_id: String, reason: String },

    #[error("Analysis oracle unavailable{}: {message}", status_suffix(.status))]
    OracleUnavailable { status: Option<u16>, message: String },

    #[error("Analysis oracle rate limited: {message}")]
    OracleRateLimited {
        retry_after_seconds: Option<u64>,
        message: String,
    },

    #[error("Analysis oracle did not answer within {timeout_seconds}s")]
    OracleTimeout { timeout_seconds: u64 },

    #[error("Malformed oracle output: {reason}")]
    MalformedOracleOutput { reason: String, excerpt: String },

    #[error("Request cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {})", s)).unwrap_or_default()
}

impl ClipError {
    /// Stable machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            ClipError::InvalidConfig(_) => "invalid_config",
            ClipError::InvalidRequest(_) => "invalid_request",
            ClipError::EmptyInput(_) => "empty_input",
            ClipError::CaptionsUnavailable { .. } => "captions_unavailable",
            ClipError::OracleUnavailable { .. } => "oracle_unavailable",
            ClipError::OracleRateLimited { .. } => "oracle_rate_limited",
            ClipError::OracleTimeout { .. } => "oracle_timeout",
            ClipError::MalformedOracleOutput { .. } => "malformed_oracle_output",
            ClipError::Cancelled => "cancelled",
            ClipError::Io(_) => "io",
        }
    }

    /// HTTP status reported by the oracle, when there was one
    pub fn status(&self) -> Option<u16> {
        match self {
            ClipError::OracleUnavailable { status, .. } => *status,
            ClipError::OracleRateLimited { .. } => Some(429),
            _ => None,
        }
    }

    /// Whether a caller-side retry policy may try the same call again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClipError::OracleUnavailable { .. }
                | ClipError::OracleRateLimited { .. }
                | ClipError::OracleTimeout { .. }
        )
    }

    /// Build a malformed-output error, keeping only a bounded excerpt of the reply
    pub fn malformed(reason: impl Into<String>, reply: &str) -> Self {
        let excerpt: String = reply.chars().take(EXCERPT_LIMIT).collect();
        ClipError::MalformedOracleOutput {
            reason: reason.into(),
            excerpt,
        }
    }

    /// Caller-facing structured form of this error
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// Structured error handed back to callers
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub kind: &'static str,
    pub message: String,
}
