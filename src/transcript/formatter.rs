use crate::captions::Cue;
use crate::error::{ClipError, Result};
use crate::ranges::{format_timestamp, SpanEnd};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One cue tagged with its start and end boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedSpan {
    pub start: f64,
    pub end: SpanEnd,
    pub text: String,
}

impl fmt::Display for AnnotatedSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}: {}", format_timestamp(self.start), self.end, self.text)
    }
}

/// Tag each cue with its boundaries; the end of cue `i` is the start of cue `i + 1`
pub fn annotate(cues: &[Cue]) -> Vec<AnnotatedSpan> {
    cues.iter()
        .enumerate()
        .map(|(i, cue)| AnnotatedSpan {
            start: cue.start_seconds,
            end: cues
                .get(i + 1)
                .map_or(SpanEnd::Unknown, |next| SpanEnd::At(next.start_seconds)),
            text: clean_text(&cue.text),
        })
        .collect()
}

/// Render cues as one annotated transcript: `"<start>-<end>: <text>"` joined by spaces
pub fn format_transcript(cues: &[Cue]) -> Result<String> {
    if cues.is_empty() {
        return Err(ClipError::EmptyInput(
            "caption track contains no cues".to_string(),
        ));
    }

    Ok(annotate(cues)
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" "))
}

/// Collapse line breaks and repeated whitespace so the chunker sees single separators
fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cue(start: f64, text: &str) -> Cue {
        Cue::new(start, text)
    }

    #[test]
    fn test_three_cue_transcript() {
        let cues = vec![cue(0.0, "a"), cue(2.5, "b"), cue(5.0, "c")];
        assert_eq!(
            format_transcript(&cues).unwrap(),
            "0.00-2.50: a 2.50-5.00: b 5.00-unknown: c"
        );
    }

    #[test]
    fn test_single_cue_has_unknown_end() {
        let spans = annotate(&[cue(12.345, "only line")]);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].end, SpanEnd::Unknown);
        assert_eq!(spans[0].to_string(), "12.35-unknown: only line");
    }

    #[test]
    fn test_half_hundredths_round_up() {
        let cues = vec![cue(0.125, "a"), cue(2.625, "b")];
        assert_eq!(format_transcript(&cues).unwrap(), "0.13-2.63: a 2.63-unknown: b");
    }

    #[test]
    fn test_multiline_cue_text_is_flattened() {
        let cues = vec![cue(1.0, "first\nline  here"), cue(3.0, " second ")];
        assert_eq!(
            format_transcript(&cues).unwrap(),
            "1.00-3.00: first line here 3.00-unknown: second"
        );
    }

    #[test]
    fn test_empty_cues_fail() {
        let err = format_transcript(&[]).unwrap_err();
        assert_eq!(err.kind(), "empty_input");
    }
}
