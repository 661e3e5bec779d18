use serde::{Deserialize, Serialize};

use super::chunk::{FILE_TYPE_KEY, FILENAME_KEY, Metadata};
use super::DocId;

/// Text pulled out of one source file, ready for chunking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub id: DocId,
    pub filename: String,
    pub file_type: String,
    pub text: String,
    pub content_hash: String,
    /// Format-specific extras (encoding, byte size, ...).
    pub metadata: Metadata,
}

impl ExtractedDocument {
    pub fn new(filename: impl Into<String>, file_type: impl Into<String>, text: String) -> Self {
        let hash = blake3::hash(text.as_bytes());
        let content_hash = hash.to_hex().to_string();

        Self {
            id: DocId::from_content(hash.as_bytes()),
            filename: filename.into(),
            file_type: file_type.into(),
            text,
            content_hash,
            metadata: Metadata::new(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Metadata stamped on every chunk cut from this document.
    pub fn chunk_metadata(&self) -> Metadata {
        let mut metadata = self.metadata.clone();
        metadata.insert(FILENAME_KEY.to_string(), self.filename.clone());
        metadata.insert(FILE_TYPE_KEY.to_string(), self.file_type.clone());
        metadata.insert("doc_id".to_string(), self.id.to_string());
        metadata.insert("content_hash".to_string(), self.content_hash.clone());
        metadata
    }
}
