use super::{ExtractionMode, OracleCall};
use crate::error::{ClipError, Result};
use crate::llm::prompts::ConsolidationHints;
use crate::llm::PromptSet;
use crate::ranges::TimeRange;
use tracing::{debug, warn};

/// Ask the oracle to turn annotated snippets into raw `{start, end}` ranges
pub(crate) async fn consolidate(
    oracle: &OracleCall<'_>,
    prompts: &PromptSet,
    mode: &ExtractionMode,
    snippets: &str,
    hints: &ConsolidationHints,
) -> Result<Vec<TimeRange>> {
    debug!("Consolidating {} chars of snippets", snippets.len());

    let reply = oracle
        .ask(prompts.consolidation_messages(mode, snippets, hints))
        .await?;

    let ranges = match parse_ranges(&reply) {
        Ok(ranges) => ranges,
        Err(e) => {
            warn!("❌ Consolidation reply rejected: {}", e);
            return Err(e);
        }
    };
    debug!("Oracle proposed {} ranges", ranges.len());
    Ok(ranges)
}

/// Parse a consolidation reply as a JSON array of ranges.
///
/// A surrounding markdown code fence is tolerated. `end` may be `"unknown"` or
/// `null` for a section running to the end of the transcript; anything else
/// that is not a JSON array of `{start, end}` seconds is a malformed reply.
pub fn parse_ranges(reply: &str) -> Result<Vec<TimeRange>> {
    let cleaned = strip_code_fence(reply);
    serde_json::from_str::<Vec<TimeRange>>(cleaned).map_err(|e| {
        ClipError::malformed(
            format!("expected a JSON array of {{start, end}} objects ({})", e),
            reply,
        )
    })
}

fn strip_code_fence(content: &str) -> &str {
    let content = content.trim();
    if !content.starts_with("```") {
        return content;
    }

    // Drop the opening fence line (which may carry a language tag) and the closing fence
    match (content.find('\n'), content.rfind("```")) {
        (Some(open_end), Some(close)) if close > open_end => content[open_end + 1..close].trim(),
        _ => content.trim_matches('`').trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_array() {
        let ranges = parse_ranges(r#"[{"start": 2564.28, "end": 2577.60}]"#).unwrap();
        assert_eq!(ranges, vec![TimeRange::new(2564.28, 2577.60)]);
    }

    #[test]
    fn test_parse_fenced_array() {
        let reply = "```json\n[\n  {\"start\": 1, \"end\": 20.5},\n  {\"start\": 40, \"end\": 61}\n]\n```";
        let ranges = parse_ranges(reply).unwrap();
        assert_eq!(ranges, vec![TimeRange::new(1.0, 20.5), TimeRange::new(40.0, 61.0)]);
    }

    #[test]
    fn test_parse_unknown_end() {
        let ranges =
            parse_ranges(r#"[{"start": 20, "end": 25}, {"start": 45, "end": "unknown"}]"#).unwrap();
        assert_eq!(ranges, vec![TimeRange::new(20.0, 25.0), TimeRange::unbounded(45.0)]);

        let ranges = parse_ranges(r#"[{"start": 45, "end": null}]"#).unwrap();
        assert_eq!(ranges, vec![TimeRange::unbounded(45.0)]);
    }

    #[test]
    fn test_parse_empty_array() {
        assert!(parse_ranges(" [] ").unwrap().is_empty());
    }

    #[test]
    fn test_prose_is_malformed() {
        let err = parse_ranges("Here are the sections: 10.00 - 25.00").unwrap_err();
        assert_eq!(err.kind(), "malformed_oracle_output");
    }

    #[test]
    fn test_empty_reply_is_malformed() {
        assert_eq!(parse_ranges("").unwrap_err().kind(), "malformed_oracle_output");
    }

    #[test]
    fn test_wrong_shape_is_malformed() {
        let err = parse_ranges(r#"[{"from": 1, "to": 2}]"#).unwrap_err();
        assert_eq!(err.kind(), "malformed_oracle_output");

        let err = parse_ranges(r#"{"start": 1, "end": 2}"#).unwrap_err();
        assert_eq!(err.kind(), "malformed_oracle_output");
    }
}
