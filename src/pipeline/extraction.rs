use super::{ExtractionMode, OracleCall};
use crate::config::PipelineConfig;
use crate::error::{ClipError, Result};
use crate::llm::{ChatMessage, PromptSet};
use crate::transcript::chunk_transcript;
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info};

/// Run the extraction pass over every chunk and, when the combined result is
/// still too large for one prompt (or refinement is forced), a second
/// refinement pass over the combined snippets.
pub(crate) async fn extract_snippets(
    oracle: &OracleCall<'_>,
    prompts: &PromptSet,
    mode: &ExtractionMode,
    transcript: &str,
    max_length: usize,
    config: &PipelineConfig,
) -> Result<String> {
    let chunks = chunk_transcript(transcript, max_length)?;
    info!(
        "✂️ Split transcript ({} chars) into {} chunks of at most {} chars",
        transcript.chars().count(),
        chunks.len(),
        max_length
    );

    let replies = run_pass(oracle, chunks, config.max_concurrent_requests, |chunk| {
        prompts.extraction_messages(mode, chunk)
    })
    .await?;
    let combined = join_replies(replies);

    if combined.is_empty() {
        return Ok(combined);
    }

    let oversized = combined.chars().count() > max_length;
    if !oversized && !config.always_refine {
        debug!("First pass produced {} chars, no refinement needed", combined.len());
        return Ok(combined);
    }

    let chunks = chunk_transcript(&combined, max_length)?;
    info!("🔁 Refining {} chunks of extracted snippets", chunks.len());

    let replies = run_pass(oracle, chunks, config.max_concurrent_requests, |chunk| {
        prompts.refinement_messages(mode, chunk)
    })
    .await?;

    Ok(join_replies(replies))
}

/// Ask the oracle about every chunk with bounded concurrency.
///
/// Replies come back in chunk order. The first error stops the pass and drops
/// every call still in flight.
async fn run_pass<F>(
    oracle: &OracleCall<'_>,
    chunks: Vec<String>,
    max_concurrent: usize,
    build_messages: F,
) -> Result<Vec<String>>
where
    F: Fn(&str) -> Vec<ChatMessage>,
{
    let total = chunks.len();

    stream::iter(chunks.into_iter().enumerate())
        .map(move |(index, chunk)| {
            let messages = build_messages(&chunk);
            async move {
                debug!("Chunk {}/{} ({} chars) sent to oracle", index + 1, total, chunk.len());
                let reply = oracle.ask(messages).await?;
                Ok::<_, ClipError>(reply)
            }
        })
        .buffered(max_concurrent.max(1))
        .try_collect()
        .await
}

/// Newline-join replies, skipping ones that carry no snippets
fn join_replies(replies: Vec<String>) -> String {
    replies
        .iter()
        .map(|reply| reply.trim())
        .filter(|reply| !is_blank_reply(reply))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Oracles asked to "respond with an empty string" sometimes reply with literal quotes
fn is_blank_reply(reply: &str) -> bool {
    matches!(reply, "" | "\"\"" | "''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_replies_skips_blank_replies() {
        let joined = join_replies(vec![
            "0.00-2.00: a\n".to_string(),
            "   ".to_string(),
            "\"\"".to_string(),
            " 5.00-7.00: b".to_string(),
        ]);
        assert_eq!(joined, "0.00-2.00: a\n5.00-7.00: b");
    }

    #[test]
    fn test_join_replies_empty() {
        assert_eq!(join_replies(Vec::new()), "");
    }
}
