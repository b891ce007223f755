//! Size-driven splitting primitives.
//!
//! These are the fallback strategies every other chunking path degrades
//! to: a fixed-size sliding window with overlap, and a recursive
//! separator split that prefers semantic boundaries (blank line, line
//! break, sentence end, space) before hard-slicing.
//!
//! All sizes are measured in **characters**, never bytes, so chunk
//! boundaries always fall on valid UTF-8 character boundaries.

/// Split `text` into overlapping fixed-size windows.
///
/// Consecutive windows share exactly `overlap` characters: the window
/// step is `size - overlap`. Text no longer than `size` comes back as a
/// single chunk. Nothing is ever dropped or truncated.
pub fn sliding_window(text: &str, size: usize, overlap: usize) -> Vec<String> {
    assert!(size > 0, "window size must be > 0");
    assert!(overlap < size, "overlap must be < window size");

    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= size {
        return vec![text.to_string()];
    }

    let step = size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end >= chars.len() {
            break;
        }
        start += step;
    }

    chunks
}

/// Separator preference order: blank line, line break, sentence end, space.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Split `text` into pieces of at most `max_chars` characters, cutting at
/// the coarsest separator that fits. Pieces that no separator can shrink
/// are hard-sliced on character boundaries as a last resort.
pub fn split_by_separators(text: &str, max_chars: usize) -> Vec<String> {
    assert!(max_chars > 0, "max_chars must be > 0");

    // Collapse runs of blank lines so the first separator behaves.
    let normalized = collapse_blank_lines(text);
    recursive_split(&normalized, max_chars, 0)
}

fn recursive_split(text: &str, max_chars: usize, sep_idx: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    if sep_idx >= SEPARATORS.len() {
        // Hard slice on char boundaries.
        let chars: Vec<char> = text.chars().collect();
        return chars
            .chunks(max_chars)
            .map(|c| c.iter().collect())
            .collect();
    }

    let separator = SEPARATORS[sep_idx];
    let sep_chars = separator.chars().count();
    let parts: Vec<&str> = text.split(separator).collect();

    if parts.len() == 1 {
        return recursive_split(text, max_chars, sep_idx + 1);
    }

    let mut chunks = Vec::new();
    let mut buf: Vec<&str> = Vec::new();
    let mut buf_len = 0usize;

    for part in parts {
        let part_len = part.chars().count() + sep_chars;

        if buf_len + part_len > max_chars && !buf.is_empty() {
            chunks.push(buf.join(separator));
            buf.clear();
            buf_len = 0;
        }

        if part_len > max_chars {
            // A single piece is still too big at this separator level.
            chunks.extend(recursive_split(part, max_chars, sep_idx + 1));
        } else {
            buf.push(part);
            buf_len += part_len;
        }
    }

    if !buf.is_empty() {
        chunks.push(buf.join(separator));
    }

    chunks.retain(|c| !c.trim().is_empty());
    chunks
}

fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut newlines = 0;
    for ch in text.chars() {
        if ch == '\n' {
            newlines += 1;
            if newlines <= 2 {
                out.push(ch);
            }
        } else {
            newlines = 0;
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_text_single_window() {
        let chunks = sliding_window("short text", 3000, 500);
        assert_eq!(chunks, vec!["short text".to_string()]);
    }

    #[test]
    fn test_window_overlap_exact() {
        // 4000 chars with window 3000 / overlap 500 → exactly 2 chunks,
        // sharing a 500-char seam.
        let text: String = (0..4000).map(|i| ((i % 26) as u8 + b'a') as char).collect();
        let chunks = sliding_window(&text, 3000, 500);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), 3000);
        assert_eq!(chunks[1].chars().count(), 1500);

        let tail: String = chunks[0].chars().skip(2500).collect();
        let head: String = chunks[1].chars().take(500).collect();
        assert_eq!(tail, head);
    }

    #[test]
    fn test_window_covers_everything() {
        let text: String = "x".repeat(10_000);
        let chunks = sliding_window(&text, 3000, 500);
        // Step 2500: starts at 0, 2500, 5000, 7500 — last window reaches the end.
        assert_eq!(chunks.len(), 4);
        let total: usize = chunks.iter().map(|c| c.chars().count()).sum();
        assert!(total >= 10_000);
    }

    #[test]
    fn test_window_multibyte_safe() {
        let text = "ação pública municipal ".repeat(300);
        let chunks = sliding_window(&text, 1000, 100);
        for chunk in &chunks {
            assert!(std::str::from_utf8(chunk.as_bytes()).is_ok());
        }
    }

    #[test]
    #[should_panic(expected = "overlap must be < window size")]
    fn test_window_rejects_bad_overlap() {
        sliding_window("text", 10, 10);
    }

    #[test]
    fn test_separator_split_prefers_blank_lines() {
        let text = format!("{}\n\n{}", "a".repeat(40), "b".repeat(40));
        let chunks = split_by_separators(&text, 50);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].starts_with('a'));
        assert!(chunks[1].starts_with('b'));
    }

    #[test]
    fn test_separator_split_falls_through_to_sentences() {
        let text = "First sentence here. Second sentence here. Third sentence here.";
        let chunks = split_by_separators(text, 30);
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 30, "oversized: {chunk:?}");
        }
    }

    #[test]
    fn test_separator_split_hard_slices_unbreakable_text() {
        let text = "x".repeat(100);
        let chunks = split_by_separators(&text, 30);
        assert_eq!(chunks.len(), 4);
        let total: usize = chunks.iter().map(|c| c.len()).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn test_separator_split_small_input_untouched() {
        let chunks = split_by_separators("tiny", 100);
        assert_eq!(chunks, vec!["tiny".to_string()]);
    }
}
