use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocQaError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Unsupported or unreadable document: {0}")]
    Format(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector index error: {0}, run `docqa clear` and re-ingest to rebuild")]
    Index(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DocQaError {
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound(_) | Self::Format(_) => 1,
            Self::Config(_) => 3,
            Self::Embedding(_) | Self::Generation(_) => 4,
            Self::Index(_) => 5,
            Self::Cancelled => 130,
            Self::Io(_) | Self::Serialization(_) => 10,
        }
    }
}

pub type Result<T> = std::result::Result<T, DocQaError>;
