use std::sync::Arc;
use tempfile::TempDir;
use tokio::fs;
use transcript_clipper::captions::CaptionSource;
use transcript_clipper::llm::prompts::CONSOLIDATION_PROMPT;
use transcript_clipper::{
    format_transcript, ClipPipeline, DirectoryCaptionSource, PipelineConfig, ScriptedLLM,
    TimeRange,
};

const EPISODE_SRT: &str = "1
00:00:00,000 --> 00:00:04,000
Welcome back to the show.

2
00:00:04,500 --> 00:00:09,000
Today we talk about sleep.

3
00:00:09,250 --> 00:00:15,000
Most people need eight hours.
";

#[tokio::test]
async fn test_srt_captions_are_annotated() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("ep7.srt"), EPISODE_SRT).await.unwrap();

    let source = DirectoryCaptionSource::new(temp_dir.path());
    let cues = source.fetch_cues("ep7").await.unwrap();
    let transcript = format_transcript(&cues).unwrap();

    assert_eq!(
        transcript,
        "0.00-4.50: Welcome back to the show. \
         4.50-9.25: Today we talk about sleep. \
         9.25-unknown: Most people need eight hours."
    );
}

#[tokio::test]
async fn test_json_captions_take_precedence() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("ep7.srt"), EPISODE_SRT).await.unwrap();
    fs::write(
        temp_dir.path().join("ep7.json"),
        r#"[{"start": 1.5, "text": "from json"}, {"start": "3.0", "text": "second"}]"#,
    )
    .await
    .unwrap();

    let source = DirectoryCaptionSource::new(temp_dir.path());
    let cues = source.fetch_cues("ep7").await.unwrap();
    assert_eq!(cues.len(), 2);
    assert_eq!(cues[0].text, "from json");
    assert_eq!(cues[1].start_seconds, 3.0);
}

#[tokio::test]
async fn test_path_like_video_ids_are_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let source = DirectoryCaptionSource::new(temp_dir.path());

    for video_id in ["../secrets", "a/b", ""] {
        let err = source.fetch_cues(video_id).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_request", "video id {:?}", video_id);
    }
}

#[tokio::test]
async fn test_topic_search_over_caption_files() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("ep7.srt"), EPISODE_SRT).await.unwrap();

    let llm = Arc::new(ScriptedLLM::new(|messages| {
        if messages[0].content == CONSOLIDATION_PROMPT {
            Ok(r#"[{"start": 4.5, "end": 15.0}]"#.to_string())
        } else {
            Ok("4.50-9.25: Today we talk about sleep. 9.25-unknown: Most people need eight hours."
                .to_string())
        }
    }));
    let captions = Arc::new(DirectoryCaptionSource::new(temp_dir.path()));
    let pipeline = ClipPipeline::new(llm, captions, PipelineConfig::default()).unwrap();

    let ranges = pipeline.extract_by_topic("ep7", "sleep").await.unwrap();
    assert_eq!(ranges, vec![TimeRange::new(4.5, 15.0)]);
}
