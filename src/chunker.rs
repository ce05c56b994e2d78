//! Paragraph-based chunking with sentence-aware overlap (§4.4).
//!
//! Paragraphs (text separated by one or more blank lines) are accumulated
//! greedily against a character budget derived from the configured token
//! target. A paragraph that alone exceeds the budget is emitted whole
//! rather than split mid-sentence. Each chunk after the first is seeded
//! with a tail of the previous chunk, cut at a sentence boundary when one
//! can be found nearby, so retrieval never hands back a chunk that opens
//! mid-thought.

use crate::config::ChunkerConfig;
use crate::types::ChunkDraft;
use regex::Regex;

const CHARS_PER_TOKEN: usize = 4;

pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Splits `text` into chunks. Returns no chunks for text with no
    /// non-blank content.
    pub fn chunk(&self, text: &str) -> Vec<ChunkDraft> {
        let char_budget = self.config.chunk_tokens * CHARS_PER_TOKEN;
        let overlap_budget = self.config.chunk_overlap_tokens * CHARS_PER_TOKEN;

        let paragraphs = split_paragraphs(text);
        let mut drafts: Vec<ChunkDraft> = Vec::new();
        let mut index: i64 = 0;

        let mut current = String::new();
        let mut current_start = 0usize;
        let mut current_end = 0usize;
        let mut pending_overlap: Option<(String, usize)> = None;

        for (paragraph, p_start, p_end) in paragraphs {
            if paragraph.len() > char_budget {
                if !current.is_empty() {
                    push_chunk(&mut drafts, &mut index, &current, current_start, current_end);
                    pending_overlap = seed_overlap(&current, current_end, overlap_budget);
                    current.clear();
                }

                push_chunk(&mut drafts, &mut index, &paragraph, p_start, p_end);
                pending_overlap = seed_overlap(&paragraph, p_end, overlap_budget);
                continue;
            }

            if current.is_empty() {
                let (seed_text, seed_start) = begin_chunk(&mut pending_overlap, p_start);
                current = seed_text;
                current_start = seed_start;
            }

            let joiner = if current.is_empty() { 0 } else { 2 };
            if !current.is_empty() && current.len() + joiner + paragraph.len() > char_budget {
                push_chunk(&mut drafts, &mut index, &current, current_start, current_end);
                pending_overlap = seed_overlap(&current, current_end, overlap_budget);
                current.clear();

                let (seed_text, seed_start) = begin_chunk(&mut pending_overlap, p_start);
                current = seed_text;
                current_start = seed_start;
            }

            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(&paragraph);
            current_end = p_end;
        }

        if !current.is_empty() {
            push_chunk(&mut drafts, &mut index, &current, current_start, current_end);
        }

        drafts
    }
}

fn push_chunk(drafts: &mut Vec<ChunkDraft>, index: &mut i64, text: &str, start: usize, end: usize) {
    drafts.push(ChunkDraft {
        index: *index,
        text: text.to_string(),
        token_count: approx_tokens(text),
        start_char: start,
        end_char: end,
    });
    *index += 1;
}

fn begin_chunk(pending_overlap: &mut Option<(String, usize)>, fallback_start: usize) -> (String, usize) {
    match pending_overlap.take() {
        Some((seed, start)) => (seed, start),
        None => (String::new(), fallback_start),
    }
}

/// `ceil(len(text) / 4)`, the crate-wide token approximation. Never a real
/// tokenizer.
pub fn approx_tokens(text: &str) -> i64 {
    ((text.len() + CHARS_PER_TOKEN - 1) / CHARS_PER_TOKEN) as i64
}

/// Splits text on blank lines into (paragraph, start_char, end_char)
/// triples, trimming leading/trailing whitespace from each paragraph's span.
fn split_paragraphs(text: &str) -> Vec<(String, usize, usize)> {
    let mut paragraphs = Vec::new();
    let mut para_start: Option<usize> = None;
    let mut para_end = 0usize;
    let mut offset = 0usize;

    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        let trimmed = line.trim_end_matches('\n');

        if trimmed.trim().is_empty() {
            if let Some(start) = para_start.take() {
                paragraphs.push(trim_span(text, start, para_end));
            }
        } else {
            if para_start.is_none() {
                para_start = Some(line_start);
            }
            para_end = line_start + trimmed.len();
        }
    }

    if let Some(start) = para_start {
        paragraphs.push(trim_span(text, start, para_end));
    }

    paragraphs
}

/// Trims leading/trailing whitespace from `text[start..end]`, returning the
/// trimmed text with its span adjusted to match.
fn trim_span(text: &str, start: usize, end: usize) -> (String, usize, usize) {
    let raw = &text[start..end];
    let new_start = start + (raw.len() - raw.trim_start().len());
    let new_end = start + raw.trim_end().len();
    (text[new_start..new_end].to_string(), new_start, new_end)
}

/// Seeds the next chunk from the tail of `content`, cutting at the last
/// sentence boundary (punctuation, whitespace, capital letter) found in the
/// trailing `overlap_budget` characters. Falls back to a verbatim tail when
/// no such boundary exists.
fn seed_overlap(content: &str, content_end: usize, overlap_budget: usize) -> Option<(String, usize)> {
    if overlap_budget == 0 || content.is_empty() {
        return None;
    }

    let window_start = content.len().saturating_sub(overlap_budget);
    let window = &content[window_start..];

    let sentence_break = Regex::new(r"[.!?]\s+[A-Z]").expect("static pattern is valid");
    if let Some(mat) = sentence_break.find_iter(window).last() {
        let cut = mat.end() - 1;
        let seed = window[cut..].to_string();
        if !seed.trim().is_empty() {
            let seed_start = content_end.saturating_sub(window.len() - cut);
            return Some((seed, seed_start));
        }
    }

    let seed_start = content_end.saturating_sub(window.len());
    Some((window.to_string(), seed_start))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(chunk_tokens: usize, overlap_tokens: usize) -> ChunkerConfig {
        ChunkerConfig {
            chunk_tokens,
            chunk_overlap_tokens: overlap_tokens,
        }
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunker = Chunker::new(config(512, 50));
        let chunks = chunker.chunk("This is a short onboarding note.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].text, "This is a short onboarding note.");
    }

    #[test]
    fn paragraphs_are_trimmed_of_surrounding_whitespace() {
        let paragraphs = split_paragraphs("  Indented first line.  \n\nSecond paragraph.   ");
        assert_eq!(paragraphs[0].0, "Indented first line.");
        assert_eq!(paragraphs[1].0, "Second paragraph.");
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let chunker = Chunker::new(config(512, 50));
        assert!(chunker.chunk("   \n\n  ").is_empty());
    }

    #[test]
    fn long_text_is_split_into_multiple_chunks_with_monotone_indices() {
        let chunker = Chunker::new(config(20, 5));
        let paragraphs: Vec<String> = (0..10)
            .map(|i| format!("Paragraph number {i} has some onboarding content in it."))
            .collect();
        let text = paragraphs.join("\n\n");

        let chunks = chunker.chunk(&text);
        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i as i64);
        }
        for window in chunks.windows(2) {
            assert!(window[0].start_char <= window[1].start_char);
        }
    }

    #[test]
    fn oversize_paragraph_is_emitted_whole() {
        let chunker = Chunker::new(config(5, 2));
        let huge_paragraph = "word ".repeat(50);
        let text = format!("Intro line.\n\n{huge_paragraph}\n\nOutro line.");

        let chunks = chunker.chunk(&text);
        let oversize = chunks
            .iter()
            .find(|c| c.text == huge_paragraph.trim())
            .expect("oversize paragraph should appear verbatim in one chunk");
        assert_eq!(oversize.text, huge_paragraph.trim());
    }

    #[test]
    fn token_count_matches_ceil_len_over_four() {
        let chunker = Chunker::new(config(512, 50));
        let chunks = chunker.chunk("1234567");
        assert_eq!(chunks[0].token_count, 2);
    }

    #[test]
    fn chunks_after_the_first_carry_overlap_from_the_previous_tail() {
        let chunker = Chunker::new(config(15, 8));
        let text = "First paragraph ends here. Second paragraph starts here.\n\nThird paragraph continues the story. Fourth paragraph wraps up.\n\nFifth paragraph is the closer. Sixth paragraph is the epilogue.";

        let chunks = chunker.chunk(text);
        assert!(chunks.len() > 1);
        for window in chunks.windows(2) {
            let prev_tail: String = window[0]
                .text
                .chars()
                .rev()
                .take(10)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            let overlap_found = prev_tail
                .split_whitespace()
                .any(|word| window[1].text.contains(word));
            assert!(
                overlap_found || window[1].text.len() < 10,
                "expected some overlap between consecutive chunks"
            );
        }
    }

    proptest::proptest! {
        #[test]
        fn every_chunk_has_a_nonnegative_token_count_matching_its_text(
            text in "[a-zA-Z0-9 .!?\n]{0,500}",
        ) {
            let chunker = Chunker::new(config(50, 10));
            let chunks = chunker.chunk(&text);
            for chunk in &chunks {
                proptest::prop_assert_eq!(chunk.token_count, approx_tokens(&chunk.text));
                proptest::prop_assert!(!chunk.text.is_empty());
            }
        }

        #[test]
        fn chunk_indices_are_always_contiguous_from_zero(
            text in "[a-zA-Z0-9 .!?\n]{0,500}",
        ) {
            let chunker = Chunker::new(config(50, 10));
            let chunks = chunker.chunk(&text);
            for (i, chunk) in chunks.iter().enumerate() {
                proptest::prop_assert_eq!(chunk.index, i as i64);
            }
        }
    }
}
