use std::fmt;

use serde::{Deserialize, Serialize};

use super::Chunk;

#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub query: String,
    pub top_k: Option<usize>,
    pub threshold: Option<f32>,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: None,
            threshold: None,
        }
    }

    #[must_use]
    pub const fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    #[must_use]
    pub const fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(flatten)]
    pub chunk: Chunk,
    pub score: f32,
}

impl SearchResult {
    pub const fn new(chunk: Chunk, score: f32) -> Self {
        Self { chunk, score }
    }

    pub fn text(&self) -> &str {
        &self.chunk.text
    }

    pub fn filename(&self) -> Option<&str> {
        self.chunk.filename()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub count: usize,
    pub dimension: Option<usize>,
}

impl IndexStats {
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Ranked, source-labelled excerpts packed for one query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextBlock {
    excerpts: Vec<String>,
    truncated: bool,
}

impl ContextBlock {
    pub(crate) const fn from_parts(excerpts: Vec<String>, truncated: bool) -> Self {
        Self {
            excerpts,
            truncated,
        }
    }

    pub fn excerpts(&self) -> &[String] {
        &self.excerpts
    }

    pub const fn is_empty(&self) -> bool {
        self.excerpts.is_empty()
    }

    /// Whether the last excerpt was cut to fit the length budget.
    pub const fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Character count of the packed excerpts, excluding join separators.
    pub fn packed_len(&self) -> usize {
        self.excerpts.iter().map(|e| e.chars().count()).sum()
    }

    pub fn render(&self) -> String {
        self.excerpts.join("\n")
    }
}

impl fmt::Display for ContextBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
