//! Overlapping, boundary-aware text chunking.
//!
//! All offsets are character (not byte) positions into the cleaned text.

use crate::config::ChunkingConfig;
use crate::domain::{Chunk, ChunkStrategy, Metadata};
use crate::error::{DocQaError, Result};

/// How far back from a window's end to look for sentence-ending punctuation.
const SENTENCE_LOOKBACK: usize = 200;

pub const STRATEGY_KEY: &str = "chunk_strategy";
pub const CHAR_COUNT_KEY: &str = "char_count";

#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
    strategy: ChunkStrategy,
}

impl Chunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(DocQaError::Config("chunk_size must be positive".to_string()));
        }
        if chunk_overlap >= chunk_size {
            return Err(DocQaError::Config(format!(
                "chunk_overlap ({chunk_overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }

        Ok(Self {
            chunk_size,
            chunk_overlap,
            strategy: ChunkStrategy::default(),
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        Ok(Self::new(config.chunk_size, config.chunk_overlap)?.with_strategy(config.strategy))
    }

    #[must_use]
    pub const fn with_strategy(mut self, strategy: ChunkStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub const fn strategy(&self) -> ChunkStrategy {
        self.strategy
    }

    /// Chunks `text` with the configured strategy.
    pub fn split(&self, text: &str, metadata: &Metadata) -> Vec<Chunk> {
        match self.strategy {
            ChunkStrategy::Window => self.chunk(text, metadata),
            ChunkStrategy::Paragraph => self.chunk_by_paragraphs(text, metadata),
        }
    }

    /// Sliding-window chunking of the cleaned text.
    ///
    /// Every chunk gets the chunker's own metadata entries (`chunk_strategy`,
    /// `char_count`) and then the caller's `metadata` on top, so a caller key
    /// with the same name replaces the chunker's value.
    pub fn chunk(&self, text: &str, metadata: &Metadata) -> Vec<Chunk> {
        let cleaned = clean_text(text);
        if cleaned.is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = cleaned.chars().collect();
        self.window_spans(&chars)
            .into_iter()
            .enumerate()
            .map(|(chunk_id, span)| {
                build_chunk(span, chunk_id, ChunkStrategy::Window, metadata)
            })
            .collect()
    }

    /// Splits on blank lines first, windowing only paragraphs longer than `chunk_size`.
    ///
    /// Chunk ids stay contiguous across the whole document.
    pub fn chunk_by_paragraphs(&self, text: &str, metadata: &Metadata) -> Vec<Chunk> {
        let cleaned = clean_text(text);
        let mut chunks = Vec::new();
        let mut offset = 0;

        for paragraph in cleaned.split("\n\n") {
            let paragraph_start = offset;
            offset += paragraph.chars().count() + 2;

            let trimmed = paragraph.trim();
            if trimmed.is_empty() {
                continue;
            }

            let leading = paragraph.chars().take_while(|c| c.is_whitespace()).count();
            let start = paragraph_start + leading;
            let chars: Vec<char> = trimmed.chars().collect();

            let spans = if chars.len() <= self.chunk_size {
                vec![Span {
                    start,
                    end: start + chars.len(),
                    text: trimmed.to_string(),
                }]
            } else {
                self.window_spans(&chars)
                    .into_iter()
                    .map(|span| span.shifted(start))
                    .collect()
            };

            for span in spans {
                let chunk_id = chunks.len();
                chunks.push(build_chunk(
                    span,
                    chunk_id,
                    ChunkStrategy::Paragraph,
                    metadata,
                ));
            }
        }

        chunks
    }

    fn window_spans(&self, chars: &[char]) -> Vec<Span> {
        let len = chars.len();
        let mut spans = Vec::new();
        let mut start = 0;

        while start < len {
            let mut end = start + self.chunk_size;

            if end < len {
                if let Some(boundary) = find_sentence_boundary(chars, start, end) {
                    end = boundary;
                } else if let Some(boundary) = find_word_boundary(chars, start, end) {
                    end = boundary;
                }
            }

            let span_end = end.min(len);
            let text: String = chars[start..span_end].iter().collect();
            let text = text.trim();
            if !text.is_empty() {
                spans.push(Span {
                    start,
                    end: span_end,
                    text: text.to_string(),
                });
            }

            // Must strictly advance past this window's start.
            let next = end.saturating_sub(self.chunk_overlap);
            start = if next > start { next } else { end };
        }

        spans
    }
}

struct Span {
    start: usize,
    end: usize,
    text: String,
}

impl Span {
    fn shifted(self, by: usize) -> Self {
        Self {
            start: self.start + by,
            end: self.end + by,
            text: self.text,
        }
    }
}

fn build_chunk(span: Span, chunk_id: usize, strategy: ChunkStrategy, caller: &Metadata) -> Chunk {
    let mut metadata = Metadata::new();
    metadata.insert(STRATEGY_KEY.to_string(), strategy.as_str().to_string());
    metadata.insert(
        CHAR_COUNT_KEY.to_string(),
        span.text.chars().count().to_string(),
    );
    metadata.extend(caller.iter().map(|(k, v)| (k.clone(), v.clone())));

    Chunk {
        text: span.text,
        chunk_id,
        start_pos: span.start,
        end_pos: span.end,
        metadata,
    }
}

/// Last `.`, `!` or `?` in the final stretch of the window that is followed by
/// whitespace or the end of the text. Returns the position just past it.
fn find_sentence_boundary(chars: &[char], start: usize, end: usize) -> Option<usize> {
    let search_start = start.max(end.saturating_sub(SENTENCE_LOOKBACK));

    (search_start..end).rev().find_map(|i| {
        let terminal = matches!(chars[i], '.' | '!' | '?');
        let followed_by_space = chars.get(i + 1).is_none_or(|c| c.is_whitespace());
        (terminal && followed_by_space).then_some(i + 1)
    })
}

/// Last whitespace strictly after `start`, scanning back from `end - 1`.
fn find_word_boundary(chars: &[char], start: usize, end: usize) -> Option<usize> {
    (start + 1..end)
        .rev()
        .find(|&i| chars[i].is_whitespace())
        .map(|i| i + 1)
}

/// Collapses 3+ newlines to two and 2+ spaces to one, trims every line and the whole text.
pub fn clean_text(text: &str) -> String {
    let text = collapse_runs(text, '\n', 2);
    let text = collapse_runs(&text, ' ', 1);

    text.split('\n')
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn collapse_runs(text: &str, target: char, keep: usize) -> String {
    let mut out = String::with_capacity(text.len());
    let mut run = 0;

    for c in text.chars() {
        if c == target {
            run += 1;
            if run <= keep {
                out.push(c);
            }
        } else {
            run = 0;
            out.push(c);
        }
    }

    out
}
