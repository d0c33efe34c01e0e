//! Time ranges and the deterministic range reducer
//!
//! The oracle is asked to merge and filter ranges itself, but its output is
//! never trusted: every range set goes through [`reduce_ranges`] before it
//! is returned to a caller.

use crate::error::{ClipError, Result};
use serde::de::{self, Unexpected};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use tracing::{debug, warn};

const UNKNOWN_END: &str = "unknown";

/// Seconds rendered with two decimals, halves rounded away from zero
pub(crate) fn format_timestamp(seconds: f64) -> String {
    format!("{:.2}", (seconds * 100.0).round() / 100.0)
}

/// Upper bound of a transcript span or clip range
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpanEnd {
    At(f64),
    /// Runs to the end of the transcript, no reliable upper bound
    Unknown,
}

impl fmt::Display for SpanEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpanEnd::At(seconds) => f.write_str(&format_timestamp(*seconds)),
            SpanEnd::Unknown => f.write_str(UNKNOWN_END),
        }
    }
}

impl Serialize for SpanEnd {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            SpanEnd::At(seconds) => serializer.serialize_f64(*seconds),
            SpanEnd::Unknown => serializer.serialize_str(UNKNOWN_END),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawEnd {
    Seconds(f64),
    Text(String),
    Null(()),
}

/// Accepts seconds (number or numeric string), `"unknown"` or `null`
impl<'de> Deserialize<'de> for SpanEnd {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match RawEnd::deserialize(deserializer)? {
            RawEnd::Null(()) => Ok(SpanEnd::Unknown),
            RawEnd::Seconds(seconds) => Ok(SpanEnd::At(seconds)),
            RawEnd::Text(text) => {
                let text = text.trim();
                if text.eq_ignore_ascii_case(UNKNOWN_END) {
                    return Ok(SpanEnd::Unknown);
                }
                text.parse::<f64>().map(SpanEnd::At).map_err(|_| {
                    de::Error::invalid_value(Unexpected::Str(text), &"seconds, \"unknown\" or null")
                })
            }
        }
    }
}

/// A candidate clip, in seconds from the start of the video
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: SpanEnd,
}

/// Ordered, non-overlapping ranges that survived reduction
pub type ReducedRangeSet = Vec<TimeRange>;

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self {
            start,
            end: SpanEnd::At(end),
        }
    }

    /// A range running to the end of the transcript
    pub fn unbounded(start: f64) -> Self {
        Self {
            start,
            end: SpanEnd::Unknown,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.end == SpanEnd::Unknown
    }

    /// Length of the range in seconds, `None` when unbounded
    pub fn duration(&self) -> Option<f64> {
        match self.end {
            SpanEnd::At(end) => Some(end - self.start),
            SpanEnd::Unknown => None,
        }
    }

    /// Finite start, and a finite `end > start` unless unbounded
    pub fn is_valid(&self) -> bool {
        self.start.is_finite()
            && match self.end {
                SpanEnd::At(end) => end.is_finite() && end > self.start,
                SpanEnd::Unknown => true,
            }
    }

    /// Extend this range over `next` when the gap between them is below `gap_threshold`.
    /// Unbounded ranges never take part in a merge.
    fn absorb(&mut self, next: &TimeRange, gap_threshold: f64) -> bool {
        match (self.end, next.end) {
            (SpanEnd::At(end), SpanEnd::At(next_end)) if next.start - end < gap_threshold => {
                self.end = SpanEnd::At(end.max(next_end));
                true
            }
            _ => false,
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", format_timestamp(self.start), self.end)
    }
}

/// Thresholds applied by [`reduce_ranges`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReducerPolicy {
    /// Ranges whose gap is strictly below this are merged
    pub gap_threshold: f64,
    /// Merged ranges shorter than this are dropped; 0 disables the filter
    pub min_duration: f64,
}

impl ReducerPolicy {
    pub fn new(gap_threshold: f64, min_duration: f64) -> Self {
        Self {
            gap_threshold,
            min_duration,
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.gap_threshold.is_finite() || self.gap_threshold < 0.0 {
            return Err(ClipError::InvalidConfig(format!(
                "gap threshold must be a non-negative number, got {}",
                self.gap_threshold
            )));
        }
        if !self.min_duration.is_finite() || self.min_duration < 0.0 {
            return Err(ClipError::InvalidConfig(format!(
                "minimum duration must be a non-negative number, got {}",
                self.min_duration
            )));
        }
        Ok(())
    }
}

impl Default for ReducerPolicy {
    fn default() -> Self {
        Self::new(10.0, 10.0)
    }
}

/// Sort, merge near neighbours, then drop ranges that are too short.
///
/// Invalid ranges (non-finite bounds or `end <= start`) are discarded before
/// merging. A range with an unknown end is kept as its own entry: nothing is
/// merged into or across it and it is never dropped for its length.
/// Reducing an already reduced set with the same policy returns it unchanged.
pub fn reduce_ranges(ranges: Vec<TimeRange>, policy: &ReducerPolicy) -> Result<ReducedRangeSet> {
    policy.validate()?;

    let total = ranges.len();
    let mut valid: Vec<TimeRange> = ranges.into_iter().filter(TimeRange::is_valid).collect();
    if valid.len() < total {
        warn!("Dropped {} invalid ranges from oracle output", total - valid.len());
    }

    valid.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut merged: Vec<TimeRange> = Vec::with_capacity(valid.len());
    for range in valid {
        let absorbed = merged
            .last_mut()
            .map_or(false, |running| running.absorb(&range, policy.gap_threshold));
        if !absorbed {
            merged.push(range);
        }
    }

    let before_filter = merged.len();
    merged.retain(|r| r.duration().map_or(true, |d| d >= policy.min_duration));

    debug!(
        "Reduced {} ranges to {} ({} below {:.1}s dropped, {} unbounded)",
        total,
        merged.len(),
        before_filter - merged.len(),
        policy.min_duration,
        merged.iter().filter(|r| r.is_unbounded()).count()
    );

    Ok(merged)
}
