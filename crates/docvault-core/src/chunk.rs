//! Sentence-boundary text chunker.
//!
//! Splits document text into [`TextChunk`]s of at most `max_chunk_chars`
//! characters. Splitting only ever happens between sentences, so a chunk
//! never ends in the middle of one.
//!
//! # Algorithm
//!
//! 1. Split text into sentences on `.`, `!` and `?`. A run of terminators
//!    (`"Really?!"`) stays attached to the sentence it closes.
//! 2. Discard sentences that are empty after trimming.
//! 3. Accumulate sentences into a buffer, joined by a single space.
//! 4. When adding the next sentence would push the buffer past
//!    `max_chunk_chars` and the buffer is non-empty, flush the buffer as a
//!    chunk and start a new one with that sentence.
//! 5. Flush the final buffer.
//!
//! A sentence longer than `max_chunk_chars` is never cut: it becomes an
//! oversized chunk of its own.
//!
//! # Example
//!
//! ```rust
//! use docvault_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("First sentence. Second one!", 800);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].text, "First sentence. Second one!");
//! assert_eq!(chunks[0].total_chunks, 1);
//! ```

use crate::models::TextChunk;

const TERMINATORS: [char; 3] = ['.', '!', '?'];

/// Split text into sentence-aligned chunks of at most `max_chunk_chars`
/// characters (Unicode scalar values, not bytes).
///
/// # Guarantees
///
/// - Indices are contiguous: `0, 1, …, N-1`, and every chunk carries `N`.
/// - Every chunk except an oversized single sentence fits the limit.
/// - Empty or whitespace-only input produces no chunks.
pub fn chunk_text(text: &str, max_chunk_chars: usize) -> Vec<TextChunk> {
    let mut pieces: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut buf_chars = 0usize;

    for sentence in split_sentences(text) {
        let sentence_chars = sentence.chars().count();
        let would_be = if buf.is_empty() {
            sentence_chars
        } else {
            buf_chars + 1 + sentence_chars
        };

        if would_be > max_chunk_chars && !buf.is_empty() {
            pieces.push(std::mem::take(&mut buf));
            buf_chars = 0;
        }

        if !buf.is_empty() {
            buf.push(' ');
            buf_chars += 1;
        }
        buf.push_str(sentence);
        buf_chars += sentence_chars;
    }

    if !buf.is_empty() {
        pieces.push(buf);
    }

    let total = pieces.len();
    pieces
        .into_iter()
        .enumerate()
        .map(|(index, text)| TextChunk {
            text,
            index,
            total_chunks: total,
        })
        .collect()
}

/// Split text into trimmed, non-empty sentences, keeping terminators.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !TERMINATORS.contains(&c) {
            continue;
        }
        let mut end = i + c.len_utf8();
        while let Some(&(j, next)) = chars.peek() {
            if TERMINATORS.contains(&next) {
                end = j + next.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        push_sentence(&mut sentences, &text[start..end]);
        start = end;
    }
    push_sentence(&mut sentences, &text[start..]);

    sentences
}

fn push_sentence<'a>(sentences: &mut Vec<&'a str>, raw: &'a str) {
    let trimmed = raw.trim();
    // A bare terminator run ("...") carries no sentence.
    if trimmed.chars().any(|c| !TERMINATORS.contains(&c)) {
        sentences.push(trimmed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", 800);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("", 800).is_empty());
        assert!(chunk_text("   \n\t ", 800).is_empty());
        assert!(chunk_text("...!?", 800).is_empty());
    }

    #[test]
    fn test_split_sentences_keeps_terminator_runs() {
        let sentences = split_sentences("Is it done?! Yes. Trailing text");
        assert_eq!(sentences, vec!["Is it done?!", "Yes.", "Trailing text"]);
    }

    #[test]
    fn test_sentences_exceed_limit() {
        let text = "This is sentence one. This is sentence two. This is sentence three.";
        let chunks = chunk_text(text, 25);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, "This is sentence one.");
        assert_eq!(chunks[2].text, "This is sentence three.");
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i);
            assert_eq!(c.total_chunks, 3);
        }
    }

    #[test]
    fn test_greedy_accumulation() {
        let text = "Aaa. Bbb. Ccc. Ddd.";
        // "Aaa. Bbb." is 9 chars, adding " Ccc." would make 14.
        let chunks = chunk_text(text, 10);
        let texts: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["Aaa. Bbb.", "Ccc. Ddd."]);
    }

    #[test]
    fn test_oversized_sentence_not_split() {
        let long = format!("{} end.", "word ".repeat(60));
        let text = format!("Short one. {} Tail.", long);
        let chunks = chunk_text(&text, 40);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].text, long.trim());
        assert!(chunks[1].text.chars().count() > 40);
    }

    #[test]
    fn test_size_bound_and_completeness() {
        let text = (0..60)
            .map(|i| format!("Sentence number {} talks about item {}.", i, i * 7))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunk_text(&text, 120);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.chars().count() <= 120);
        }

        let rejoined: Vec<&str> = chunks
            .iter()
            .flat_map(|c| split_sentences(&c.text))
            .collect();
        assert_eq!(rejoined, split_sentences(&text));
    }

    #[test]
    fn test_multibyte_counts_chars() {
        let text = "Ünïcödé sëntençe. Ånother öne.";
        let chunks = chunk_text(text, 17);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "Ünïcödé sëntençe.");
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha. Beta! Gamma? Delta.";
        assert_eq!(chunk_text(text, 8), chunk_text(text, 8));
    }
}
