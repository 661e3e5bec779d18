use async_trait::async_trait;

use crate::domain::{EmbeddedChunk, IndexStats, SearchResult};
use crate::error::Result;

/// Nearest-neighbour store over embedded chunks.
///
/// Implementations serialize `add` calls themselves; `search` may run
/// concurrently with writes and sees whatever was last committed.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Adds all chunks or none of them.
    async fn add(&self, chunks: Vec<EmbeddedChunk>) -> Result<()>;

    /// Returns at most `top_k` results sorted by descending score.
    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<SearchResult>>;

    async fn clear(&self) -> Result<()>;
    async fn stats(&self) -> Result<IndexStats>;
    async fn persist(&self) -> Result<()>;
    async fn load(&self) -> Result<()>;
}
