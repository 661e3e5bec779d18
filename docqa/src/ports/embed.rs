use async_trait::async_trait;

use crate::error::{DocQaError, Result};

#[async_trait]
pub trait EmbeddingGateway: Send + Sync {
    /// Embeds `texts` in a single upstream call, one vector per input in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn model_name(&self) -> &str;

    /// Output dimension, when known before the first call.
    fn dimension(&self) -> Option<usize>;

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        ensure_not_blank(text)?;

        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        match (vectors.pop(), vectors.is_empty()) {
            (Some(vector), true) if !vector.is_empty() => Ok(vector),
            _ => Err(DocQaError::Embedding(format!(
                "{} returned no usable vector",
                self.model_name()
            ))),
        }
    }

    async fn embed_many(&self, texts: &[String], batch_size: usize) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        for text in texts {
            ensure_not_blank(text)?;
        }

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(batch_size.max(1)) {
            let embedded = self.embed_batch(batch).await?;
            if embedded.len() != batch.len() {
                return Err(DocQaError::Embedding(format!(
                    "{} returned {} vectors for {} inputs",
                    self.model_name(),
                    embedded.len(),
                    batch.len()
                )));
            }
            vectors.extend(embedded);
        }

        Ok(vectors)
    }
}

pub fn ensure_not_blank(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(DocQaError::Embedding("text cannot be empty".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct RecordingEmbedder {
        calls: Mutex<Vec<usize>>,
        drop_last: bool,
    }

    #[async_trait]
    impl EmbeddingGateway for RecordingEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.lock().unwrap().push(texts.len());
            let mut vectors: Vec<Vec<f32>> = texts
                .iter()
                .map(|t| vec![t.len() as f32, 1.0])
                .collect();
            if self.drop_last {
                vectors.pop();
            }
            Ok(vectors)
        }

        fn model_name(&self) -> &str {
            "recording"
        }

        fn dimension(&self) -> Option<usize> {
            Some(2)
        }
    }

    fn embedder(drop_last: bool) -> RecordingEmbedder {
        RecordingEmbedder {
            calls: Mutex::new(Vec::new()),
            drop_last,
        }
    }

    #[test]
    fn test_embed_many_preserves_order_across_batches() {
        let embedder = embedder(false);
        let texts: Vec<String> = ["a", "bb", "ccc", "dddd", "eeeee"]
            .iter()
            .map(ToString::to_string)
            .collect();

        let vectors = tokio_test::block_on(embedder.embed_many(&texts, 2)).unwrap();

        let lengths: Vec<f32> = vectors.iter().map(|v| v[0]).collect();
        assert_eq!(lengths, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(*embedder.calls.lock().unwrap(), vec![2, 2, 1]);
    }

    #[test]
    fn test_blank_input_is_rejected_before_any_call() {
        let embedder = embedder(false);
        let texts = vec!["fine".to_string(), "   ".to_string()];

        let err = tokio_test::block_on(embedder.embed_many(&texts, 10)).unwrap_err();
        assert!(matches!(err, DocQaError::Embedding(_)));
        assert!(embedder.calls.lock().unwrap().is_empty());

        let err = tokio_test::block_on(embedder.embed_one("")).unwrap_err();
        assert!(matches!(err, DocQaError::Embedding(_)));
    }

    #[test]
    fn test_short_upstream_response_is_an_error() {
        let embedder = embedder(true);
        let texts = vec!["one".to_string(), "two".to_string()];

        let err = tokio_test::block_on(embedder.embed_many(&texts, 10)).unwrap_err();
        assert!(matches!(err, DocQaError::Embedding(_)));
    }

    #[test]
    fn test_empty_input_list_is_empty_output() {
        let embedder = embedder(false);
        let vectors = tokio_test::block_on(embedder.embed_many(&[], 10)).unwrap();
        assert!(vectors.is_empty());
    }
}
