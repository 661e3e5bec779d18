use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::{EmbeddedChunk, IndexStats, SearchResult};
use crate::error::{DocQaError, Result};
use crate::ports::VectorIndex;

/// Exact cosine search over every stored vector, persisted as one JSON file.
pub struct FlatIndex {
    path: Option<PathBuf>,
    state: RwLock<IndexState>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexState {
    dimension: Option<usize>,
    entries: Vec<EmbeddedChunk>,
}

impl IndexState {
    fn check_dimension(&self, got: usize) -> Result<()> {
        match self.dimension {
            Some(expected) if expected != got => Err(DocQaError::Index(format!(
                "vector dimension {got} does not match index dimension {expected}"
            ))),
            _ => Ok(()),
        }
    }
}

impl FlatIndex {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            state: RwLock::new(IndexState::default()),
        }
    }

    /// An index that never touches disk; `persist` and `load` are no-ops.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: RwLock::new(IndexState::default()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[async_trait]
impl VectorIndex for FlatIndex {
    async fn add(&self, chunks: Vec<EmbeddedChunk>) -> Result<()> {
        let Some(first) = chunks.first() else {
            return Ok(());
        };
        let dimension = first.dimension();
        if dimension == 0 {
            return Err(DocQaError::Index("cannot index an empty vector".to_string()));
        }
        if let Some(bad) = chunks.iter().find(|c| c.dimension() != dimension) {
            return Err(DocQaError::Index(format!(
                "batch mixes vector dimensions {dimension} and {}",
                bad.dimension()
            )));
        }
        if let Some(bad) = chunks.iter().find(|c| !is_finite(&c.vector)) {
            return Err(non_finite(bad));
        }

        let mut state = self.state.write().await;
        state.check_dimension(dimension)?;
        state.dimension = Some(dimension);
        state.entries.extend(chunks);
        debug!(count = state.entries.len(), "index updated");
        Ok(())
    }

    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        let state = self.state.read().await;
        if state.entries.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        state.check_dimension(vector.len())?;
        if !is_finite(vector) {
            return Err(DocQaError::Index(
                "query vector has non-finite components".to_string(),
            ));
        }

        let mut scored: Vec<(usize, f32)> = state
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, cosine_similarity(vector, &entry.vector)))
            .collect();
        // Stable, so equal scores keep insertion order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| SearchResult::new(state.entries[i].chunk.clone(), score))
            .collect())
    }

    async fn clear(&self) -> Result<()> {
        let mut state = self.state.write().await;
        *state = IndexState::default();
        Ok(())
    }

    async fn stats(&self) -> Result<IndexStats> {
        let state = self.state.read().await;
        Ok(IndexStats {
            count: state.entries.len(),
            dimension: state.dimension,
        })
    }

    async fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let bytes = {
            let state = self.state.read().await;
            serde_json::to_vec(&*state)?
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;

        debug!(path = %path.display(), "index persisted");
        Ok(())
    }

    async fn load(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                *self.state.write().await = IndexState::default();
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let loaded: IndexState = serde_json::from_slice(&bytes).map_err(|e| {
            DocQaError::Index(format!("cannot read {}: {e}", path.display()))
        })?;
        if let Some(bad) = loaded
            .entries
            .iter()
            .find(|e| Some(e.dimension()) != loaded.dimension)
        {
            return Err(DocQaError::Index(format!(
                "{} holds a vector of dimension {} in an index of dimension {:?}",
                path.display(),
                bad.dimension(),
                loaded.dimension
            )));
        }

        if let Some(bad) = loaded.entries.iter().find(|e| !is_finite(&e.vector)) {
            return Err(non_finite(bad));
        }

        debug!(count = loaded.entries.len(), path = %path.display(), "index loaded");
        *self.state.write().await = loaded;
        Ok(())
    }
}

fn is_finite(vector: &[f32]) -> bool {
    vector.iter().all(|x| x.is_finite())
}

fn non_finite(entry: &EmbeddedChunk) -> DocQaError {
    DocQaError::Index(format!(
        "chunk {} of {} has a non-finite vector component",
        entry.chunk.chunk_id,
        entry.chunk.filename().unwrap_or("an unnamed document")
    ))
}

/// Cosine similarity in `[-1, 1]`; zero for a zero-length vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;
    use crate::domain::{Chunk, Metadata};

    fn entry(id: usize, filename: &str, vector: Vec<f32>) -> EmbeddedChunk {
        let mut metadata = Metadata::new();
        metadata.insert("filename".to_string(), filename.to_string());
        Chunk {
            text: format!("chunk {id}"),
            chunk_id: id,
            start_pos: 0,
            end_pos: 7,
            metadata,
        }
        .embedded(vector)
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_search_ranks_by_descending_score() {
        let index = FlatIndex::in_memory();
        index
            .add(vec![
                entry(0, "a.txt", vec![0.0, 1.0]),
                entry(1, "b.txt", vec![1.0, 0.0]),
                entry(2, "c.txt", vec![1.0, 1.0]),
            ])
            .await
            .unwrap();

        let results = index.search(&[1.0, 0.1], 2).await.unwrap();

        let ids: Vec<usize> = results.iter().map(|r| r.chunk.chunk_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_rejected() {
        let index = FlatIndex::in_memory();
        index.add(vec![entry(0, "a.txt", vec![1.0, 0.0])]).await.unwrap();

        let err = index
            .add(vec![entry(1, "b.txt", vec![1.0, 0.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, DocQaError::Index(_)));

        let err = index.search(&[1.0, 0.0, 0.0], 5).await.unwrap_err();
        assert!(matches!(err, DocQaError::Index(_)));
        assert_eq!(index.stats().await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_mixed_batch_adds_nothing() {
        let index = FlatIndex::in_memory();
        let err = index
            .add(vec![entry(0, "a.txt", vec![1.0]), entry(1, "a.txt", vec![1.0, 2.0])])
            .await
            .unwrap_err();

        assert!(matches!(err, DocQaError::Index(_)));
        assert!(index.stats().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_index_returns_nothing() {
        let index = FlatIndex::in_memory();
        assert!(index.search(&[1.0, 0.0], 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persist_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("index.json");

        let index = FlatIndex::open(&path);
        index
            .add(vec![entry(0, "a.txt", vec![1.0, 0.0]), entry(1, "b.txt", vec![0.0, 1.0])])
            .await
            .unwrap();
        index.persist().await.unwrap();
        let before = index.search(&[0.2, 1.0], 2).await.unwrap();

        let reopened = FlatIndex::open(&path);
        reopened.load().await.unwrap();

        assert_eq!(
            reopened.stats().await.unwrap(),
            IndexStats {
                count: 2,
                dimension: Some(2)
            }
        );
        assert_eq!(reopened.search(&[0.2, 1.0], 2).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_non_finite_vectors_are_rejected() {
        let index = FlatIndex::in_memory();
        index
            .add(vec![entry(0, "a.txt", vec![1.0, 0.0])])
            .await
            .unwrap();

        let err = index
            .add(vec![
                entry(1, "b.txt", vec![0.5, 0.5]),
                entry(2, "c.txt", vec![f32::NAN, 1.0]),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, DocQaError::Index(msg) if msg.contains("c.txt")));

        let err = index
            .add(vec![entry(3, "d.txt", vec![f32::INFINITY, 1.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, DocQaError::Index(_)));

        assert_eq!(index.stats().await.unwrap().count, 1);
        assert!(matches!(
            index.search(&[f32::NAN, 0.0], 1).await,
            Err(DocQaError::Index(_))
        ));
    }

    #[tokio::test]
    async fn test_search_orders_many_entries_with_extreme_values() {
        let index = FlatIndex::in_memory();
        let entries: Vec<EmbeddedChunk> = (0..64)
            .map(|i| {
                let vector = if i % 3 == 0 {
                    vec![f32::MAX, 1.0]
                } else {
                    vec![1.0, i as f32]
                };
                entry(i, "a.txt", vector)
            })
            .collect();
        index.add(entries).await.unwrap();

        let results = index.search(&[1.0, 0.0], 64).await.unwrap();

        assert_eq!(results.len(), 64);
        assert!(results.windows(2).all(|w| w[0].score.total_cmp(&w[1].score).is_ge()));
    }

    #[tokio::test]
    async fn test_load_out_of_range_vector_is_index_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.json");
        std::fs::write(
            &path,
            br#"{"dimension":2,"entries":[{"text":"x","chunk_id":0,"start_pos":0,"end_pos":1,"metadata":{},"vector":[1e300,1.0]}]}"#,
        )
        .unwrap();
        let index = FlatIndex::open(&path);

        assert!(matches!(index.load().await, Err(DocQaError::Index(_))));
        assert!(index.stats().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let index = FlatIndex::open(dir.path().join("absent.json"));

        index.load().await.unwrap();

        assert!(index.stats().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_corrupt_file_is_index_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let err = FlatIndex::open(&path).load().await.unwrap_err();

        assert!(matches!(err, DocQaError::Index(_)));
    }

    #[tokio::test]
    async fn test_clear_then_persist_empties_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.json");
        let index = FlatIndex::open(&path);
        index.add(vec![entry(0, "a.txt", vec![1.0])]).await.unwrap();
        index.persist().await.unwrap();

        index.clear().await.unwrap();
        index.persist().await.unwrap();

        let reopened = FlatIndex::open(&path);
        reopened.load().await.unwrap();
        assert_eq!(reopened.stats().await.unwrap(), IndexStats::default());
    }
}
