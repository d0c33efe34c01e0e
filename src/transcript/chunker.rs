use crate::error::{ClipError, Result};

/// Split `text` into chunks of at most `max_length` characters.
///
/// A chunk ends at the last whitespace character inside its window, and that
/// separator is consumed. When a window holds no whitespace at all the chunk
/// is cut at exactly `max_length` characters, splitting the token.
pub fn chunk_transcript(text: &str, max_length: usize) -> Result<Vec<String>> {
    if max_length == 0 {
        return Err(ClipError::InvalidConfig(
            "chunk length must be greater than 0".to_string(),
        ));
    }

    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let byte_at = |i: usize| chars.get(i).map_or(text.len(), |(b, _)| *b);

    let mut chunks = Vec::with_capacity(chars.len() / max_length + 1);
    let mut start = 0;

    while start < chars.len() {
        let window_end = start + max_length;
        if window_end >= chars.len() {
            chunks.push(text[byte_at(start)..].to_string());
            break;
        }

        // The character at `window_end` is the first one outside the window;
        // splitting on it still yields a chunk of exactly `max_length`.
        let split = (start + 1..=window_end)
            .rev()
            .find(|&i| chars[i].1.is_whitespace());

        match split {
            Some(split) => {
                chunks.push(text[byte_at(start)..byte_at(split)].to_string());
                start = split + 1;
            }
            None => {
                chunks.push(text[byte_at(start)..byte_at(window_end)].to_string());
                start = window_end;
            }
        }
    }

    Ok(chunks)
}
