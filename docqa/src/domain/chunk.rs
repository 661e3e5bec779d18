use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Metadata key holding the source document's file name.
pub const FILENAME_KEY: &str = "filename";
/// Metadata key holding the source document's type (`txt`, `md`, ...).
pub const FILE_TYPE_KEY: &str = "file_type";

pub type Metadata = BTreeMap<String, String>;

/// A bounded excerpt of one document's cleaned text.
///
/// `start_pos` and `end_pos` are character offsets into the cleaned text the
/// chunk was cut from, with `start_pos < end_pos`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub chunk_id: usize,
    pub start_pos: usize,
    pub end_pos: usize,
    pub metadata: Metadata,
}

impl Chunk {
    pub fn filename(&self) -> Option<&str> {
        self.metadata.get(FILENAME_KEY).map(String::as_str)
    }

    pub fn file_type(&self) -> Option<&str> {
        self.metadata.get(FILE_TYPE_KEY).map(String::as_str)
    }

    #[must_use]
    pub fn embedded(self, vector: Vec<f32>) -> EmbeddedChunk {
        EmbeddedChunk {
            chunk: self,
            vector,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedChunk {
    #[serde(flatten)]
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

impl EmbeddedChunk {
    pub fn dimension(&self) -> usize {
        self.vector.len()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStrategy {
    #[default]
    Window,
    Paragraph,
}

impl ChunkStrategy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Window => "window",
            Self::Paragraph => "paragraph",
        }
    }
}

impl std::str::FromStr for ChunkStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "window" | "sliding" => Ok(Self::Window),
            "paragraph" | "paragraphs" => Ok(Self::Paragraph),
            _ => Err(format!("Unknown chunk strategy: {s}")),
        }
    }
}
