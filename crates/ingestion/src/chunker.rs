//! Text chunking module
//!
//! Splits document text into overlapping, token-bounded chunks. A token is
//! a maximal run of non-whitespace, which keeps the split deterministic and
//! independent of any model tokenizer.
//!
//! Chunk ranges are laid out so that each chunk's range ends where the next
//! unseen token begins. Stripping every chunk's overlap with its
//! predecessor and concatenating what is left yields the input exactly.

use ragforge_common::config::ChunkingSettings;
use ragforge_common::errors::{AppError, Result};
use std::ops::Range;
use tracing::{debug, warn};

/// Configuration for text chunking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    /// Maximum tokens per chunk
    pub max_tokens: usize,
    /// Tokens each chunk repeats from the end of its predecessor
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: 1000,
            overlap_tokens: 200,
        }
    }
}

impl From<&ChunkingSettings> for ChunkingConfig {
    fn from(settings: &ChunkingSettings) -> Self {
        Self {
            max_tokens: settings.max_tokens,
            overlap_tokens: settings.overlap_tokens,
        }
    }
}

impl ChunkingConfig {
    pub fn new(max_tokens: usize, overlap_tokens: usize) -> Self {
        Self {
            max_tokens,
            overlap_tokens,
        }
    }

    /// Reject configurations where chunks could not advance
    pub fn validate(&self) -> Result<()> {
        if self.max_tokens == 0 {
            return Err(AppError::validation("max_tokens", "max_tokens must be at least 1"));
        }
        if self.overlap_tokens >= self.max_tokens {
            return Err(AppError::validation(
                "overlap_tokens",
                format!(
                    "overlap_tokens ({}) must be less than max_tokens ({})",
                    self.overlap_tokens, self.max_tokens
                ),
            ));
        }
        Ok(())
    }

    /// The nearest valid configuration
    pub fn clamped(&self) -> Self {
        let max_tokens = self.max_tokens.max(1);
        Self {
            max_tokens,
            overlap_tokens: self.overlap_tokens.min(max_tokens - 1),
        }
    }
}

/// A text chunk with its position in the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// The chunk content
    pub content: String,
    /// Index of this chunk in the document
    pub index: i32,
    /// Tokens in this chunk
    pub token_count: i32,
    /// Start character offset in the original text
    pub char_start: usize,
    /// End character offset (exclusive)
    pub char_end: usize,
    /// Byte range in the original text
    pub byte_range: Range<usize>,
}

/// Byte offset to char offset, for monotonically increasing offsets
struct CharCursor<'a> {
    text: &'a str,
    byte: usize,
    chars: usize,
}

impl<'a> CharCursor<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, byte: 0, chars: 0 }
    }

    fn advance_to(&mut self, byte: usize) -> usize {
        self.chars += self.text[self.byte..byte].chars().count();
        self.byte = byte;
        self.chars
    }
}

/// Byte ranges of every token in `text`
fn token_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start = None;

    for (i, c) in text.char_indices() {
        match (c.is_whitespace(), start) {
            (false, None) => start = Some(i),
            (true, Some(s)) => {
                spans.push(s..i);
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push(s..text.len());
    }

    spans
}

/// Split text into overlapping chunks.
///
/// Empty or whitespace-only input yields no chunks. An invalid config is
/// clamped (overlap reduced below `max_tokens`) rather than rejected.
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<TextChunk> {
    let effective = config.clamped();
    if effective != *config {
        warn!(
            max_tokens = config.max_tokens,
            overlap_tokens = config.overlap_tokens,
            "Invalid chunking config clamped"
        );
    }

    let tokens = token_spans(text);
    if tokens.is_empty() {
        return Vec::new();
    }

    let step = effective.max_tokens - effective.overlap_tokens;
    let mut starts = CharCursor::new(text);
    let mut ends = CharCursor::new(text);
    let mut chunks = Vec::new();
    let mut first = 0;

    loop {
        let last = (first + effective.max_tokens).min(tokens.len());
        let is_first = first == 0;
        let is_last = last == tokens.len();

        let byte_start = if is_first { 0 } else { tokens[first].start };
        let byte_end = if is_last { text.len() } else { tokens[last].start };

        chunks.push(TextChunk {
            content: text[byte_start..byte_end].to_string(),
            index: chunks.len() as i32,
            token_count: (last - first) as i32,
            char_start: starts.advance_to(byte_start),
            char_end: ends.advance_to(byte_end),
            byte_range: byte_start..byte_end,
        });

        if is_last {
            break;
        }
        first += step;
    }

    debug!(
        input_len = text.len(),
        token_count = tokens.len(),
        chunk_count = chunks.len(),
        max_tokens = effective.max_tokens,
        overlap_tokens = effective.overlap_tokens,
        "Text chunked"
    );

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    /// Each chunk minus its overlap with the previous one
    fn fresh_parts<'a>(text: &'a str, chunks: &[TextChunk]) -> Vec<&'a str> {
        let mut parts = Vec::new();
        let mut covered = 0;
        for chunk in chunks {
            assert!(chunk.byte_range.start <= covered);
            parts.push(&text[covered..chunk.byte_range.end]);
            covered = chunk.byte_range.end;
        }
        parts
    }

    #[test]
    fn test_empty_input() {
        let config = ChunkingConfig::default();
        assert!(chunk_text("", &config).is_empty());
        assert!(chunk_text("  \n\t ", &config).is_empty());
    }

    #[test]
    fn test_short_input_single_chunk() {
        let text = "  The quick brown fox.  ";
        let chunks = chunk_text(text, &ChunkingConfig::new(10, 2));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].token_count, 4);
        assert_eq!(chunks[0].content, text);
    }

    #[test]
    fn test_2500_words_yield_three_chunks() {
        let text = words(2500);
        let chunks = chunk_text(&text, &ChunkingConfig::new(1000, 200));

        assert_eq!(chunks.len(), 3);
        let counts: Vec<i32> = chunks.iter().map(|c| c.token_count).collect();
        assert_eq!(counts, vec![1000, 1000, 900]);
        assert!(chunks[1].content.starts_with("w800 "));
        assert!(chunks[2].content.starts_with("w1600 "));
        assert!(chunks[2].content.ends_with("w2499"));
    }

    #[test]
    fn test_coverage_reconstructs_input() {
        let text = "Alpha  beta\tgamma\n\ndelta épsilon ζeta eta theta iota kappa lambda mu ";
        for (max, overlap) in [(3, 1), (4, 0), (5, 4), (1, 0), (100, 10)] {
            let chunks = chunk_text(text, &ChunkingConfig::new(max, overlap));
            assert_eq!(fresh_parts(text, &chunks).concat(), text, "max={} overlap={}", max, overlap);

            let indices: Vec<i32> = chunks.iter().map(|c| c.index).collect();
            assert_eq!(indices, (0..chunks.len() as i32).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_overlap_is_exact() {
        let text = words(57);
        let config = ChunkingConfig::new(10, 3);
        let chunks = chunk_text(&text, &config);

        for pair in chunks.windows(2) {
            let prev: Vec<&str> = pair[0].content.split_whitespace().collect();
            let next: Vec<&str> = pair[1].content.split_whitespace().collect();
            assert_eq!(&prev[prev.len() - 3..], &next[..3]);
            assert!(next.len() <= config.max_tokens);
        }
    }

    #[test]
    fn test_char_offsets_follow_multibyte_text() {
        let text = "ééé ààà üüü ööö";
        let chunks = chunk_text(text, &ChunkingConfig::new(2, 1));

        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            let by_chars: String = text
                .chars()
                .skip(chunk.char_start)
                .take(chunk.char_end - chunk.char_start)
                .collect();
            assert_eq!(by_chars, chunk.content);
        }
    }

    #[test]
    fn test_invalid_config_is_clamped() {
        let text = words(10);
        let chunks = chunk_text(&text, &ChunkingConfig::new(4, 9));
        // Overlap clamped to 3: advances one token per chunk
        assert_eq!(chunks.len(), 7);
        assert_eq!(fresh_parts(&text, &chunks).concat(), text);
    }

    #[test]
    fn test_validate() {
        assert_ok!(ChunkingConfig::new(1000, 200).validate());
        assert_err!(ChunkingConfig::new(100, 100).validate());
        assert_err!(ChunkingConfig::new(0, 0).validate());
    }

    #[test]
    fn test_deterministic() {
        let text = words(333);
        let config = ChunkingConfig::new(50, 7);
        assert_eq!(chunk_text(&text, &config), chunk_text(&text, &config));
    }
}
