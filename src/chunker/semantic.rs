//! Semantic micro-splitting: cut where the topic shifts.
//!
//! Sentences are embedded, adjacent windows of sentence vectors are
//! compared with cosine similarity, and cuts land at similarity
//! valleys below `mean - 0.5 * stddev`. Pieces shorter than the
//! minimum are merged forward so no micro fragment is a bare heading.
//! The embedding step is the caller's problem; this module is a pure
//! function over sentence texts and their precomputed vectors, which
//! keeps the valley logic testable without a provider.

use crate::embedding::cosine_similarity;

/// Split `text` into sentences. Cuts after `.`, `?` or `!` followed by
/// whitespace, and on blank lines. Abbreviation handling is
/// deliberately loose; a split inside "Art." costs little because the
/// pieces stay adjacent.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        let boundary = matches!(c, '.' | '?' | '!')
            && chars.peek().map(|n| n.is_whitespace()).unwrap_or(true);
        let blank_line = c == '\n' && chars.peek() == Some(&'\n');
        if boundary || blank_line {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
        }
    }
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    sentences
}

/// Mean of a slice of vectors. Empty input yields an empty vector.
fn mean_vector(vectors: &[Vec<f32>]) -> Vec<f32> {
    let Some(first) = vectors.first() else {
        return Vec::new();
    };
    let mut acc = vec![0.0f32; first.len()];
    for v in vectors {
        for (a, x) in acc.iter_mut().zip(v.iter()) {
            *a += x;
        }
    }
    let n = vectors.len() as f32;
    acc.iter_mut().for_each(|a| *a /= n);
    acc
}

/// Similarity between the window of sentences ending at `i` and the
/// window starting at `i + 1`, for every adjacent pair.
fn window_similarities(embeddings: &[Vec<f32>], window: usize) -> Vec<f32> {
    let window = window.max(1);
    let mut sims = Vec::with_capacity(embeddings.len().saturating_sub(1));
    for i in 0..embeddings.len().saturating_sub(1) {
        let left_start = (i + 1).saturating_sub(window);
        let right_end = (i + 1 + window).min(embeddings.len());
        let left = mean_vector(&embeddings[left_start..=i]);
        let right = mean_vector(&embeddings[i + 1..right_end]);
        sims.push(cosine_similarity(&left, &right));
    }
    sims
}

/// Cut `sentences` at similarity valleys.
///
/// `embeddings` must be parallel to `sentences`. Boundaries land after
/// sentence `i` when the windowed similarity across `i | i+1` drops
/// below `mean - 0.5 * stddev` of all adjacent similarities. Pieces
/// shorter than `min_chars` merge into the following piece.
pub fn split_at_valleys(
    sentences: &[String],
    embeddings: &[Vec<f32>],
    window: usize,
    min_chars: usize,
) -> Vec<String> {
    assert_eq!(sentences.len(), embeddings.len());

    if sentences.len() < 3 {
        let joined = sentences.join(" ");
        return if joined.trim().is_empty() {
            Vec::new()
        } else {
            vec![joined]
        };
    }

    let sims = window_similarities(embeddings, window);
    let n = sims.len() as f32;
    let mean = sims.iter().sum::<f32>() / n;
    let variance = sims.iter().map(|s| (s - mean).powi(2)).sum::<f32>() / n;
    let threshold = mean - 0.5 * variance.sqrt();

    let mut pieces = Vec::new();
    let mut current = Vec::new();
    for (i, sentence) in sentences.iter().enumerate() {
        current.push(sentence.as_str());
        let valley = sims.get(i).map(|&s| s < threshold).unwrap_or(false);
        if valley {
            pieces.push(current.join(" "));
            current.clear();
        }
    }
    if !current.is_empty() {
        pieces.push(current.join(" "));
    }

    merge_short_forward(pieces, min_chars)
}

/// Merge pieces below the floor into their successor. A short final
/// piece merges backward instead.
fn merge_short_forward(pieces: Vec<String>, min_chars: usize) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(pieces.len());
    let mut carry = String::new();
    for piece in pieces {
        let combined = if carry.is_empty() {
            piece
        } else {
            format!("{carry} {piece}")
        };
        if combined.chars().count() < min_chars {
            carry = combined;
        } else {
            merged.push(combined);
            carry.clear();
        }
    }
    if !carry.is_empty() {
        match merged.last_mut() {
            Some(last) => {
                last.push(' ');
                last.push_str(&carry);
            }
            None => merged.push(carry),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sentences_basic() {
        let s = split_sentences("Primeira frase. Segunda frase? Terceira!");
        assert_eq!(s, vec!["Primeira frase.", "Segunda frase?", "Terceira!"]);
    }

    #[test]
    fn test_split_sentences_blank_line_is_boundary() {
        let s = split_sentences("Um parágrafo sem ponto final\n\nOutro parágrafo.");
        assert_eq!(s.len(), 2);
        assert_eq!(s[0], "Um parágrafo sem ponto final");
    }

    #[test]
    fn test_split_sentences_empty() {
        assert!(split_sentences("   ").is_empty());
    }

    // Orthogonal unit vectors give similarity 0 across the topic break
    // and 1 inside a topic, so the valley is unambiguous.
    fn axis(dim: usize, n: usize) -> Vec<f32> {
        let mut v = vec![0.0; n];
        v[dim] = 1.0;
        v
    }

    #[test]
    fn test_valley_cut_at_topic_shift() {
        let sentences: Vec<String> = (0..6).map(|i| format!("Sentença {i}.")).collect();
        let embeddings = vec![
            axis(0, 3),
            axis(0, 3),
            axis(0, 3),
            axis(1, 3),
            axis(1, 3),
            axis(1, 3),
        ];
        let pieces = split_at_valleys(&sentences, &embeddings, 1, 0);
        assert_eq!(pieces.len(), 2);
        assert!(pieces[0].contains("Sentença 2."));
        assert!(pieces[1].starts_with("Sentença 3."));
    }

    #[test]
    fn test_uniform_similarity_yields_single_piece() {
        let sentences: Vec<String> = (0..5).map(|i| format!("Frase {i}.")).collect();
        let embeddings = vec![axis(0, 2); 5];
        let pieces = split_at_valleys(&sentences, &embeddings, 2, 0);
        assert_eq!(pieces.len(), 1);
    }

    #[test]
    fn test_short_pieces_merge_forward() {
        let merged = merge_short_forward(
            vec!["abc".into(), "defghijklmnop".into(), "xy".into()],
            10,
        );
        assert_eq!(merged.len(), 1);
        assert!(merged[0].starts_with("abc defghijklmnop"));
        assert!(merged[0].ends_with("xy"));
    }

    #[test]
    fn test_too_few_sentences_returned_whole() {
        let sentences = vec!["Só uma.".to_string(), "E outra.".to_string()];
        let embeddings = vec![axis(0, 2), axis(1, 2)];
        let pieces = split_at_valleys(&sentences, &embeddings, 3, 100);
        assert_eq!(pieces, vec!["Só uma. E outra."]);
    }
}
