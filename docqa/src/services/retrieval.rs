use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use crate::config::RetrievalConfig;
use crate::domain::{ContextBlock, SearchQuery, SearchResult};
use crate::error::Result;
use crate::ports::{EmbeddingGateway, VectorIndex};

/// Budget left over below which an overflowing excerpt is dropped instead of cut.
const MIN_TRUNCATED_EXCERPT: usize = 100;
const TRUNCATION_MARKER: &str = "...\n";
const UNKNOWN_SOURCE: &str = "Unknown";

pub struct Retriever<I, E>
where
    I: VectorIndex,
    E: EmbeddingGateway,
{
    index: Arc<I>,
    embedder: Arc<E>,
    config: RetrievalConfig,
}

impl<I, E> Retriever<I, E>
where
    I: VectorIndex,
    E: EmbeddingGateway,
{
    pub const fn new(index: Arc<I>, embedder: Arc<E>, config: RetrievalConfig) -> Self {
        Self {
            index,
            embedder,
            config,
        }
    }

    pub const fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Best matches first. A blank query returns nothing without embedding it.
    pub async fn retrieve(&self, query: &str, top_k: Option<usize>) -> Result<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let top_k = top_k.filter(|k| *k > 0).unwrap_or(self.config.top_k);
        let vector = self.embedder.embed_one(query).await?;
        let results = self.index.search(&vector, top_k).await?;

        debug!(
            top_k,
            hits = results.len(),
            best = results.first().map(|r| r.score),
            "retrieved"
        );
        Ok(results)
    }

    /// `retrieve`, then drop results scoring below `threshold`. Order is kept.
    pub async fn retrieve_with_threshold(
        &self,
        query: &str,
        threshold: f32,
        top_k: Option<usize>,
    ) -> Result<Vec<SearchResult>> {
        let mut results = self.retrieve(query, top_k).await?;
        results.retain(|r| r.score >= threshold);
        Ok(results)
    }

    /// Applies the configured score threshold, if any.
    pub async fn retrieve_configured(&self, query: &str) -> Result<Vec<SearchResult>> {
        self.search(&SearchQuery::new(query)).await
    }

    /// Query-level overrides win over configuration.
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        match query.threshold.or(self.config.score_threshold) {
            Some(threshold) => {
                self.retrieve_with_threshold(&query.query, threshold, query.top_k)
                    .await
            }
            None => self.retrieve(&query.query, query.top_k).await,
        }
    }

    pub fn context(&self, results: &[SearchResult]) -> ContextBlock {
        format_context(results, self.config.max_context_length)
    }
}

/// Packs labelled excerpts in rank order until `max_length` characters.
///
/// The excerpt that would overflow is cut to the remaining budget and marked
/// with `...` when more than 100 characters remain; otherwise it is left out.
/// Packing stops at the first overflow either way.
pub fn format_context(results: &[SearchResult], max_length: usize) -> ContextBlock {
    let mut excerpts = Vec::new();
    let mut used = 0;

    for (rank, result) in results.iter().enumerate() {
        let excerpt = format!(
            "[Source {}: {} (relevance: {:.2})]\n{}\n",
            rank + 1,
            result.filename().unwrap_or(UNKNOWN_SOURCE),
            result.score,
            result.text()
        );
        let len = excerpt.chars().count();

        if used + len > max_length {
            let remaining = max_length - used;
            if remaining > MIN_TRUNCATED_EXCERPT {
                let mut cut: String = excerpt.chars().take(remaining).collect();
                cut.push_str(TRUNCATION_MARKER);
                excerpts.push(cut);
                return ContextBlock::from_parts(excerpts, true);
            }
            return ContextBlock::from_parts(excerpts, false);
        }

        excerpts.push(excerpt);
        used += len;
    }

    ContextBlock::from_parts(excerpts, false)
}

/// Distinct source filenames, sorted.
pub fn get_relevant_sources(results: &[SearchResult]) -> Vec<String> {
    results
        .iter()
        .filter_map(SearchResult::filename)
        .filter(|name| !name.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::domain::{Chunk, EmbeddedChunk, IndexStats, Metadata};

    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingGateway for CountingEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        fn model_name(&self) -> &str {
            "counting"
        }

        fn dimension(&self) -> Option<usize> {
            Some(2)
        }
    }

    /// Returns canned results in the given order, recording the requested `top_k`.
    struct CannedIndex {
        results: Vec<SearchResult>,
        requested: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl VectorIndex for CannedIndex {
        async fn add(&self, _chunks: Vec<EmbeddedChunk>) -> Result<()> {
            Ok(())
        }

        async fn search(&self, _vector: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
            self.requested.lock().unwrap().push(top_k);
            Ok(self.results.iter().take(top_k).cloned().collect())
        }

        async fn clear(&self) -> Result<()> {
            Ok(())
        }

        async fn stats(&self) -> Result<IndexStats> {
            Ok(IndexStats {
                count: self.results.len(),
                dimension: Some(2),
            })
        }

        async fn persist(&self) -> Result<()> {
            Ok(())
        }

        async fn load(&self) -> Result<()> {
            Ok(())
        }
    }

    fn result(filename: Option<&str>, text: &str, score: f32) -> SearchResult {
        let mut metadata = Metadata::new();
        if let Some(name) = filename {
            metadata.insert("filename".to_string(), name.to_string());
        }
        let chunk = Chunk {
            text: text.to_string(),
            chunk_id: 0,
            start_pos: 0,
            end_pos: text.chars().count(),
            metadata,
        };
        SearchResult::new(chunk, score)
    }

    fn retriever(
        results: Vec<SearchResult>,
        config: RetrievalConfig,
    ) -> (Retriever<CannedIndex, CountingEmbedder>, Arc<CannedIndex>, Arc<CountingEmbedder>) {
        let index = Arc::new(CannedIndex {
            results,
            requested: Mutex::new(Vec::new()),
        });
        let embedder = Arc::new(CountingEmbedder {
            calls: AtomicUsize::new(0),
        });
        let retriever = Retriever::new(Arc::clone(&index), Arc::clone(&embedder), config);
        (retriever, index, embedder)
    }

    #[tokio::test]
    async fn test_blank_query_returns_nothing_without_embedding() {
        let (retriever, index, embedder) =
            retriever(vec![result(Some("a.txt"), "x", 0.9)], RetrievalConfig::default());

        assert!(retriever.retrieve("   \n", None).await.unwrap().is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        assert!(index.requested.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retrieve_embeds_once_and_defaults_top_k() {
        let config = RetrievalConfig {
            top_k: 3,
            ..RetrievalConfig::default()
        };
        let (retriever, index, embedder) = retriever(vec![result(Some("a.txt"), "x", 0.9)], config);

        retriever.retrieve("what is x?", None).await.unwrap();
        retriever.retrieve("what is x?", Some(7)).await.unwrap();

        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
        assert_eq!(*index.requested.lock().unwrap(), vec![3, 7]);
    }

    #[tokio::test]
    async fn test_threshold_filters_without_reranking() {
        let canned = vec![
            result(Some("a.txt"), "first", 0.92),
            result(Some("b.txt"), "second", 0.71),
            result(Some("c.txt"), "third", 0.70),
            result(Some("d.txt"), "fourth", 0.40),
        ];
        let (retriever, _, _) = retriever(canned, RetrievalConfig::default());

        let kept = retriever
            .retrieve_with_threshold("q", 0.7, Some(10))
            .await
            .unwrap();

        let texts: Vec<&str> = kept.iter().map(SearchResult::text).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_configured_threshold_and_query_override() {
        let canned = vec![
            result(Some("a.txt"), "high", 0.9),
            result(Some("b.txt"), "low", 0.3),
        ];
        let config = RetrievalConfig {
            score_threshold: Some(0.5),
            ..RetrievalConfig::default()
        };
        let (retriever, _, _) = retriever(canned, config);

        assert_eq!(retriever.retrieve_configured("q").await.unwrap().len(), 1);

        let query = SearchQuery::new("q").with_threshold(0.1);
        assert_eq!(retriever.search(&query).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_sources_sorted_regardless_of_score_order() {
        let canned = vec![
            result(Some("B.txt"), "b", 0.95),
            result(Some("A.txt"), "a", 0.9),
        ];
        let (retriever, _, _) = retriever(canned, RetrievalConfig::default());

        let results = retriever.retrieve("q", Some(5)).await.unwrap();

        assert_eq!(get_relevant_sources(&results), vec!["A.txt", "B.txt"]);
    }

    #[test]
    fn test_sources_are_deduplicated() {
        let results = vec![
            result(Some("b.md"), "1", 0.9),
            result(None, "2", 0.8),
            result(Some("a.txt"), "3", 0.7),
            result(Some("b.md"), "4", 0.6),
        ];
        assert_eq!(get_relevant_sources(&results), vec!["a.txt", "b.md"]);
    }

    #[test]
    fn test_context_labels_rank_source_and_score() {
        let results = vec![
            result(Some("a.txt"), "Alpha.", 0.912),
            result(None, "Beta.", 0.5),
        ];

        let context = format_context(&results, 4000);

        assert_eq!(
            context.render(),
            "[Source 1: a.txt (relevance: 0.91)]\nAlpha.\n\n[Source 2: Unknown (relevance: 0.50)]\nBeta.\n"
        );
        assert!(!context.is_truncated());
    }

    #[test]
    fn test_overflowing_excerpt_is_truncated_when_budget_remains() {
        let text = "x".repeat(200);
        let results = vec![
            result(Some("a.txt"), &text, 0.9),
            result(Some("b.txt"), &text, 0.8),
            result(Some("c.txt"), &text, 0.7),
        ];
        let first_len = format_context(&results[..1], 10_000).packed_len();

        let context = format_context(&results, first_len + 150);

        assert_eq!(context.excerpts().len(), 2);
        assert!(context.is_truncated());
        assert!(context.excerpts()[1].starts_with("[Source 2: b.txt"));
        assert!(context.excerpts()[1].ends_with("x...\n"));
        assert_eq!(context.packed_len(), first_len + 150 + TRUNCATION_MARKER.len());
    }

    #[test]
    fn test_overflowing_excerpt_is_dropped_when_budget_is_small() {
        let text = "y".repeat(300);
        let results = vec![
            result(Some("a.txt"), &text, 0.9),
            result(Some("b.txt"), &text, 0.8),
        ];
        let first_len = format_context(&results[..1], 10_000).packed_len();

        let context = format_context(&results, first_len + 100);

        assert_eq!(context.excerpts().len(), 1);
        assert!(!context.is_truncated());
        assert_eq!(context.packed_len(), first_len);
    }

    #[test]
    fn test_packing_stops_at_first_overflow() {
        let results = vec![
            result(Some("a.txt"), &"a".repeat(500), 0.9),
            result(Some("b.txt"), &"b".repeat(5000), 0.8),
            result(Some("c.txt"), "tiny", 0.7),
        ];

        let context = format_context(&results, 600);

        assert_eq!(context.excerpts().len(), 1);
        assert!(!context.render().contains("c.txt"));
    }

    #[test]
    fn test_packed_length_is_bounded() {
        let results: Vec<SearchResult> = (0..12)
            .map(|i| result(Some("doc.txt"), &"z".repeat(37 * i + 11), 0.5))
            .collect();

        for max_length in [0, 50, 101, 150, 999, 4000] {
            let context = format_context(&results, max_length);
            assert!(context.packed_len() <= max_length + TRUNCATION_MARKER.len());
            assert_eq!(context, format_context(&results, max_length));
        }
    }

    #[test]
    fn test_empty_results_give_empty_context() {
        let context = format_context(&[], 4000);
        assert!(context.is_empty());
        assert_eq!(context.render(), "");
    }
}
