use super::Cue;
use regex::Regex;
use std::sync::OnceLock;

/// Matches `HH:MM:SS,mmm --> HH:MM:SS,mmm` (a dot is accepted for the millisecond separator)
fn timing_regex() -> &'static Regex {
    static TIMING: OnceLock<Regex> = OnceLock::new();
    TIMING.get_or_init(|| {
        Regex::new(r"^(\d{1,2}):(\d{2}):(\d{2})[,.](\d{1,3})\s*-->\s*\d{1,2}:\d{2}:\d{2}[,.]\d{1,3}")
            .expect("timing pattern is valid")
    })
}

/// Parse SubRip subtitle content into cues, one per subtitle block.
///
/// Only the block start time is kept; ends are derived from the next cue when
/// the transcript is annotated.
pub fn parse_srt(content: &str) -> Result<Vec<Cue>, String> {
    let content = content.trim_start_matches('\u{feff}');
    let mut cues = Vec::new();
    let mut current: Option<(f64, Vec<String>)> = None;

    for (line_no, raw_line) in content.lines().enumerate() {
        let line = raw_line.trim_end_matches('\r').trim();

        if line.is_empty() {
            if let Some((start, lines)) = current.take() {
                cues.push(Cue::new(start, &lines.join(" ")));
            }
            continue;
        }

        if let Some(caps) = timing_regex().captures(line) {
            if let Some((start, lines)) = current.take() {
                cues.push(Cue::new(start, &lines.join(" ")));
            }
            let start = parse_start(&caps)
                .ok_or_else(|| format!("invalid timestamp on line {}", line_no + 1))?;
            current = Some((start, Vec::new()));
            continue;
        }

        match current.as_mut() {
            Some((_, lines)) => lines.push(line.to_string()),
            // Sequence numbers precede the timing line
            None if line.chars().all(|c| c.is_ascii_digit()) => {}
            None => return Err(format!("unexpected text before timing on line {}", line_no + 1)),
        }
    }

    if let Some((start, lines)) = current.take() {
        cues.push(Cue::new(start, &lines.join(" ")));
    }

    Ok(cues)
}

fn parse_start(caps: &regex::Captures<'_>) -> Option<f64> {
    let hours: u64 = caps.get(1)?.as_str().parse().ok()?;
    let minutes: u64 = caps.get(2)?.as_str().parse().ok()?;
    let seconds: u64 = caps.get(3)?.as_str().parse().ok()?;
    let millis_str = caps.get(4)?.as_str();
    // "5" after the separator means 500ms
    let millis: u64 = format!("{:0<3}", millis_str).parse().ok()?;

    let total_millis = ((hours * 3600 + minutes * 60 + seconds) * 1000) + millis;
    Some(total_millis as f64 / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "1\n00:00:01,500 --> 00:00:04,000\nWelcome back\nto the show\n\n2\n00:00:04,000 --> 00:00:09,250\nToday we talk sleep\n\n3\n01:02:03,007 --> 01:02:05,000\nLast line\n";

    #[test]
    fn test_parse_srt_blocks() {
        let cues = parse_srt(SAMPLE).unwrap();
        assert_eq!(cues.len(), 3);
        assert_eq!(cues[0].start_seconds, 1.5);
        assert_eq!(cues[0].text, "Welcome back to the show");
        assert_eq!(cues[1].start_seconds, 4.0);
        assert_eq!(cues[2].start_seconds, 3723.007);
        assert_eq!(cues[2].text, "Last line");
    }

    #[test]
    fn test_parse_srt_with_crlf_and_bom() {
        let content = "\u{feff}1\r\n00:00:00,000 --> 00:00:02,000\r\nHi\r\n\r\n2\r\n00:00:02.5 --> 00:00:03,000\r\nThere\r\n";
        let cues = parse_srt(content).unwrap();
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].text, "Hi");
        assert_eq!(cues[1].start_seconds, 2.5);
    }

    #[test]
    fn test_parse_srt_rejects_text_before_timing() {
        assert!(parse_srt("hello there\n00:00:01,000 --> 00:00:02,000\nx\n").is_err());
    }

    #[test]
    fn test_parse_empty_srt() {
        assert!(parse_srt("").unwrap().is_empty());
    }
}
