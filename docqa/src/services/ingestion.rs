use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{info, warn};

use super::CancelFlag;
use super::chunker::Chunker;
use crate::config::IngestConfig;
use crate::domain::EmbeddedChunk;
use crate::error::Result;
use crate::ports::{DocumentExtractor, EmbeddingGateway, VectorIndex};

pub struct IngestionService<X, E, I>
where
    X: DocumentExtractor,
    E: EmbeddingGateway,
    I: VectorIndex,
{
    extractor: Arc<X>,
    embedder: Arc<E>,
    index: Arc<I>,
    chunker: Chunker,
    config: IngestConfig,
}

/// Progress notification for one input file, emitted in input order.
#[derive(Debug)]
pub enum IngestEvent<'a> {
    Indexed { file: &'a str, chunks: usize },
    Skipped(&'a FileWarning),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileWarning {
    pub file: String,
    pub message: String,
}

#[derive(Debug, Default, Serialize)]
pub struct IngestionReport {
    pub files_processed: usize,
    pub files_failed: usize,
    pub chunks_indexed: usize,
    /// Names of the files whose chunks were indexed, in input order.
    pub indexed_files: Vec<String>,
    pub warnings: Vec<FileWarning>,
    pub cancelled: bool,
}

impl IngestionReport {
    fn skip(&mut self, warning: FileWarning) {
        warn!(file = %warning.file, "{}", warning.message);
        self.files_failed += 1;
        self.warnings.push(warning);
    }
}

enum Prepared {
    Ready { file: String, chunks: Vec<EmbeddedChunk> },
    Skipped(FileWarning),
    Cancelled,
}

impl<X, E, I> IngestionService<X, E, I>
where
    X: DocumentExtractor,
    E: EmbeddingGateway,
    I: VectorIndex,
{
    pub const fn new(
        extractor: Arc<X>,
        embedder: Arc<E>,
        index: Arc<I>,
        chunker: Chunker,
        config: IngestConfig,
    ) -> Self {
        Self {
            extractor,
            embedder,
            index,
            chunker,
            config,
        }
    }

    pub async fn ingest(&self, paths: &[PathBuf], cancel: &CancelFlag) -> Result<IngestionReport> {
        self.ingest_with_progress(paths, cancel, |_| {}).await
    }

    /// Extracts, chunks and embeds up to `ingest.concurrency` files at a time,
    /// then writes each file's chunks to the index in input order.
    ///
    /// Extraction and embedding failures become warnings; an index failure
    /// aborts the run.
    pub async fn ingest_with_progress(
        &self,
        paths: &[PathBuf],
        cancel: &CancelFlag,
        mut on_event: impl FnMut(IngestEvent<'_>) + Send,
    ) -> Result<IngestionReport> {
        let mut report = IngestionReport::default();
        let mut prepared = stream::iter(paths)
            .map(|path| self.prepare(path, cancel))
            .buffered(self.config.concurrency.max(1));

        while let Some(outcome) = prepared.next().await {
            match outcome {
                Prepared::Cancelled => {
                    report.cancelled = true;
                    break;
                }
                Prepared::Skipped(warning) => {
                    on_event(IngestEvent::Skipped(&warning));
                    report.skip(warning);
                }
                Prepared::Ready { file, chunks } => {
                    if cancel.is_cancelled() {
                        report.cancelled = true;
                        break;
                    }
                    let count = chunks.len();
                    self.index.add(chunks).await?;

                    info!(file = %file, chunks = count, "indexed");
                    on_event(IngestEvent::Indexed {
                        file: &file,
                        chunks: count,
                    });
                    report.files_processed += 1;
                    report.chunks_indexed += count;
                    report.indexed_files.push(file);
                }
            }
        }

        if report.cancelled {
            warn!(
                indexed = report.files_processed,
                "ingestion cancelled, index not persisted"
            );
        } else if report.chunks_indexed > 0 {
            self.index.persist().await?;
        }

        info!(
            files = report.files_processed,
            failed = report.files_failed,
            chunks = report.chunks_indexed,
            "ingestion finished"
        );
        Ok(report)
    }

    async fn prepare(&self, path: &Path, cancel: &CancelFlag) -> Prepared {
        let label = path.display().to_string();
        let skipped = |message: String| {
            Prepared::Skipped(FileWarning {
                file: label.clone(),
                message,
            })
        };

        if cancel.is_cancelled() {
            return Prepared::Cancelled;
        }

        let document = match self.extractor.extract(path).await {
            Ok(document) => document,
            Err(e) => return skipped(e.to_string()),
        };

        let chunks = self.chunker.split(&document.text, &document.chunk_metadata());
        if chunks.is_empty() {
            return skipped("no text extracted".to_string());
        }

        if cancel.is_cancelled() {
            return Prepared::Cancelled;
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        match self.embedder.embed_many(&texts, self.config.batch_size).await {
            Ok(vectors) => Prepared::Ready {
                file: document.filename,
                chunks: chunks
                    .into_iter()
                    .zip(vectors)
                    .map(|(chunk, vector)| chunk.embedded(vector))
                    .collect(),
            },
            Err(e) => skipped(e.to_string()),
        }
    }
}
