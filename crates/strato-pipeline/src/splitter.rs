//! Long-message splitting that preserves formatting.

/// Headroom reserved per chunk for fence repair markers.
const FENCE_RESERVE: usize = 16;

/// Split `content` into chunks of at most `max_length` characters.
///
/// Splits at line boundaries first so lists and paragraphs survive; a single
/// line longer than the limit falls back to word splitting, and a single
/// oversized word is hard-sliced as the last resort.
///
/// Code fences stay matched: when a chunk boundary has to land inside a
/// fenced block, the block is closed at the end of the chunk and reopened
/// (with its language tag) at the start of the next, so every chunk renders
/// correctly on its own.
#[must_use]
pub fn split_message(content: &str, max_length: usize) -> Vec<String> {
    if max_length == 0 || content.len() <= max_length {
        return vec![content.to_string()];
    }
    // Degenerate limits can't fit fence repairs; fall back to plain slicing.
    let budget = max_length.saturating_sub(FENCE_RESERVE);
    if budget == 0 {
        return hard_slice(content, max_length);
    }

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    // Language tag of the fence open at the current position, if any.
    // Updated AFTER a line is placed, so at a break it reflects the state
    // between the previous line and the one about to be placed.
    let mut open_fence: Option<String> = None;

    let flush = |current: &mut String, chunks: &mut Vec<String>, open: &Option<String>| {
        if current.is_empty() {
            return;
        }
        let mut finished = std::mem::take(current);
        if open.is_some() {
            finished.push_str("\n```");
        }
        chunks.push(finished);
    };

    for line in content.split('\n') {
        let line_len = line.len() + 1;

        if line_len > budget {
            flush(&mut current, &mut chunks, &open_fence);
            chunks.extend(split_long_line(line, budget));
            continue;
        }

        if !current.is_empty() && current.len() + line_len > budget {
            // Break before this line: close a running fence and reopen it
            // at the top of the next chunk so both render standalone.
            flush(&mut current, &mut chunks, &open_fence);
            if let Some(lang) = &open_fence {
                current.push_str("```");
                current.push_str(lang);
            }
        }

        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);

        if let Some(marker) = fence_marker(line) {
            open_fence = match open_fence {
                Some(_) => None,
                None => Some(marker),
            };
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// `Some(language)` if the line is a fence marker.
fn fence_marker(line: &str) -> Option<String> {
    let trimmed = line.trim_start();
    trimmed
        .strip_prefix("```")
        .map(|rest| rest.trim().to_string())
}

/// Word-based fallback for one oversized line.
fn split_long_line(line: &str, max_length: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for word in line.split_whitespace() {
        if word.len() > max_length {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            chunks.extend(hard_slice(word, max_length));
            if let Some(last) = chunks.pop() {
                // Let the final slice keep accepting words.
                current = last;
            }
            continue;
        }

        if !current.is_empty() && current.len() + word.len() + 1 > max_length {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    if chunks.is_empty() {
        chunks.push(line.chars().take(max_length).collect());
    }
    chunks
}

fn hard_slice(text: &str, max_length: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest = text;
    while rest.len() > max_length {
        let mut cut = max_length.max(1);
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        chunks.push(rest[..cut].to_string());
        rest = &rest[cut..];
    }
    if !rest.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_message_single_chunk() {
        assert_eq!(split_message("hello", 2000), vec!["hello"]);
    }

    #[test]
    fn test_chunks_respect_limit() {
        let content = (0..100)
            .map(|i| format!("line number {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let chunks = split_message(&content, 100);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= 100, "chunk too long: {}", chunk.len());
        }
        // No prose lost (no fences, so chunks rejoin exactly).
        assert_eq!(chunks.join("\n"), content);
    }

    #[test]
    fn test_two_python_blocks_split_at_500() {
        let block_one = format!(
            "```python\n{}\n```",
            (0..20).map(|i| format!("print({i})")).collect::<Vec<_>>().join("\n")
        );
        let block_two = format!(
            "```python\n{}\n```",
            (0..20)
                .map(|i| format!("value_{i} = {i} * 2"))
                .collect::<Vec<_>>()
                .join("\n")
        );
        let response =
            format!("First implementation:\n{block_one}\n\nRefactored:\n{block_two}");

        let chunks = split_message(&response, 500);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= 500);
            assert_eq!(
                chunk.matches("```").count() % 2,
                0,
                "unmatched fence in chunk: {chunk:?}"
            );
        }
        // Original code lines all survive.
        for i in 0..20 {
            let combined = chunks.concat();
            assert!(combined.contains(&format!("print({i})")));
            assert!(combined.contains(&format!("value_{i} = {i} * 2")));
        }
    }

    #[test]
    fn test_reopened_fence_keeps_language() {
        let body = (0..60).map(|i| format!("x{i} = {i}")).collect::<Vec<_>>().join("\n");
        let content = format!("```python\n{body}\n```");
        let chunks = split_message(&content, 200);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.starts_with("```python"), "chunk lost its fence: {chunk:?}");
            assert_eq!(chunk.matches("```").count() % 2, 0);
        }
    }

    #[test]
    fn test_long_line_word_split() {
        let line = "word ".repeat(100);
        let chunks = split_message(line.trim(), 50);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.len() <= 50);
        }
    }

    #[test]
    fn test_single_oversized_word_hard_sliced() {
        let word = "a".repeat(120);
        let chunks = split_message(&word, 50);
        assert!(chunks.iter().all(|c| c.len() <= 50));
        assert_eq!(chunks.concat(), word);
    }

    #[test]
    fn test_zero_limit_is_identity() {
        assert_eq!(split_message("anything", 0), vec!["anything"]);
    }
}
