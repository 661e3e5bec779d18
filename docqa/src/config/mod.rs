use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::ChunkStrategy;
use crate::error::{DocQaError, Result};

mod provider;

pub use provider::{ChatProvider, EmbeddingProvider, ProviderConfig};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub db_path: PathBuf,
    pub provider: ProviderConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub strategy: ChunkStrategy,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            strategy: ChunkStrategy::Window,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub score_threshold: Option<f32>,
    pub max_context_length: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            score_threshold: None,
            max_context_length: 4000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub concurrency: usize,
    pub batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            batch_size: 100,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let global = Self::load_global()?;
        let project = Self::load_file(Path::new(".docqa/docqa.toml"))?;
        let merged = match project {
            Some(project) => Self::merge(global, project),
            None => global,
        };
        let config = merged.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn load_global() -> Result<Self> {
        let config_dir = directories::ProjectDirs::from("", "", "docqa").map_or_else(
            || PathBuf::from("~/.config/docqa"),
            |d| d.config_dir().to_path_buf(),
        );

        Ok(Self::load_file(&config_dir.join("config.toml"))?.unwrap_or_default())
    }

    fn load_file(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content).map(Some)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| DocQaError::Config(e.to_string()))
    }

    /// Project settings win; credentials and the index path fall back to the global file.
    fn merge(global: Self, project: Self) -> Self {
        Self {
            db_path: if project.db_path.as_os_str().is_empty() {
                global.db_path
            } else {
                project.db_path
            },
            provider: ProviderConfig {
                openai_api_key: project
                    .provider
                    .openai_api_key
                    .or(global.provider.openai_api_key),
                google_api_key: project
                    .provider
                    .google_api_key
                    .or(global.provider.google_api_key),
                anthropic_api_key: project
                    .provider
                    .anthropic_api_key
                    .or(global.provider.anthropic_api_key),
                ..project.provider
            },
            chunking: project.chunking,
            retrieval: project.retrieval,
            ingest: project.ingest,
        }
    }

    fn with_env_overrides(self) -> Result<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    pub fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(provider) = lookup("AI_PROVIDER") {
            // Shorthand for both; a backend without embeddings only switches chat.
            if let Ok(embedding) = provider.parse() {
                self.provider.embedding = embedding;
            }
            self.provider.chat = parse_env("AI_PROVIDER", &provider)?;
        }
        if let Some(value) = lookup("DOCQA_EMBEDDING_PROVIDER") {
            self.provider.embedding = parse_env("DOCQA_EMBEDDING_PROVIDER", &value)?;
        }
        if let Some(value) = lookup("DOCQA_CHAT_PROVIDER") {
            self.provider.chat = parse_env("DOCQA_CHAT_PROVIDER", &value)?;
        }
        if let Some(value) = lookup("DOCQA_CHUNK_SIZE") {
            self.chunking.chunk_size = parse_env("DOCQA_CHUNK_SIZE", &value)?;
        }
        if let Some(value) = lookup("DOCQA_CHUNK_OVERLAP") {
            self.chunking.chunk_overlap = parse_env("DOCQA_CHUNK_OVERLAP", &value)?;
        }
        if let Some(value) = lookup("DOCQA_TOP_K") {
            self.retrieval.top_k = parse_env("DOCQA_TOP_K", &value)?;
        }
        if let Some(value) = lookup("DOCQA_SCORE_THRESHOLD") {
            self.retrieval.score_threshold = Some(parse_env("DOCQA_SCORE_THRESHOLD", &value)?);
        }
        if let Some(value) = lookup("DOCQA_MAX_CONTEXT_LENGTH") {
            self.retrieval.max_context_length = parse_env("DOCQA_MAX_CONTEXT_LENGTH", &value)?;
        }
        if let Some(value) = lookup("DOCQA_DB_PATH") {
            self.db_path = PathBuf::from(value);
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.provider.openai_api_key = Some(key);
        }
        if let Some(key) = lookup("GOOGLE_API_KEY") {
            self.provider.google_api_key = Some(key);
        }
        if let Some(key) = lookup("ANTHROPIC_API_KEY") {
            self.provider.anthropic_api_key = Some(key);
        }
        if let Some(url) = lookup("OLLAMA_HOST") {
            self.provider.ollama_url = url;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        let chunking = &self.chunking;
        if chunking.chunk_size == 0 {
            return Err(DocQaError::Config("chunk_size must be positive".to_string()));
        }
        if chunking.chunk_overlap >= chunking.chunk_size {
            return Err(DocQaError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunking.chunk_overlap, chunking.chunk_size
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(DocQaError::Config("top_k must be positive".to_string()));
        }
        if self.retrieval.max_context_length == 0 {
            return Err(DocQaError::Config(
                "max_context_length must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Location of the persisted index, defaulting to the user data directory.
    pub fn index_path(&self) -> PathBuf {
        if !self.db_path.as_os_str().is_empty() {
            return self.db_path.clone();
        }

        directories::ProjectDirs::from("", "", "docqa").map_or_else(
            || PathBuf::from(".docqa/index.json"),
            |d| d.data_dir().join("index.json"),
        )
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| DocQaError::Config(format!("invalid {key}={value:?}: {e}")))
}
