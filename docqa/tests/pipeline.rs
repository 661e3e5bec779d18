//! End to end: files on disk through extraction, chunking, the persisted
//! index, retrieval and the not-found policy.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use docqa::Result;
use docqa::adapters::{FlatIndex, TextExtractor};
use docqa::config::{IngestConfig, RetrievalConfig};
use docqa::domain::Session;
use docqa::ports::{AnswerGenerator, EmbeddingGateway, GenerationRequest, VectorIndex};
use docqa::services::chat::FALLBACK_ANSWER;
use docqa::services::{CancelFlag, ChatService, Chunker, IngestionService, Retriever};

const DIMENSION: usize = 1024;
const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// Bag of words hashed into a fixed number of buckets. Short words are ignored
/// so questions only match documents on content words.
struct HashingEmbedder;

impl HashingEmbedder {
    fn vector(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; DIMENSION];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() >= 4)
        {
            let hash = word
                .to_lowercase()
                .bytes()
                .fold(FNV_OFFSET, |h, b| (h ^ u64::from(b)).wrapping_mul(FNV_PRIME));
            vector[(hash % DIMENSION as u64) as usize] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingGateway for HashingEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }

    fn model_name(&self) -> &str {
        "hashing"
    }

    fn dimension(&self) -> Option<usize> {
        Some(DIMENSION)
    }
}

/// Answers from the context when it mentions the borrow checker, hedges otherwise.
#[derive(Default)]
struct CannedGenerator {
    contexts: Mutex<Vec<String>>,
}

impl CannedGenerator {
    fn calls(&self) -> usize {
        self.contexts.lock().unwrap().len()
    }
}

#[async_trait]
impl AnswerGenerator for CannedGenerator {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String> {
        self.contexts.lock().unwrap().push(request.context.to_string());
        if request.context.contains("borrow checker") {
            Ok("Per rust.md, the borrow checker enforces ownership at compile time.".to_string())
        } else {
            Ok("I don't know.".to_string())
        }
    }

    fn model_name(&self) -> &str {
        "canned"
    }
}

struct Fixture {
    dir: TempDir,
    index: Arc<FlatIndex>,
    generator: Arc<CannedGenerator>,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "rust.md",
            "# Ownership\n\nThe **borrow checker** enforces ownership rules at compile time. \
             Each value has exactly one owner, and references must never outlive it.",
        );
        write(
            dir.path(),
            "garden.txt",
            "Tomatoes need full sun and regular watering. Prune suckers weekly in summer.",
        );
        write(dir.path(), "scan.pdf", "%PDF-1.7");

        let index = Arc::new(FlatIndex::open(dir.path().join("index.json")));
        Self {
            dir,
            index,
            generator: Arc::new(CannedGenerator::default()),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn ingestion(&self) -> IngestionService<TextExtractor, HashingEmbedder, FlatIndex> {
        IngestionService::new(
            Arc::new(TextExtractor::new()),
            Arc::new(HashingEmbedder),
            Arc::clone(&self.index),
            Chunker::new(200, 40).unwrap(),
            IngestConfig {
                concurrency: 2,
                batch_size: 8,
            },
        )
    }

    fn chat(&self) -> ChatService<FlatIndex, HashingEmbedder, CannedGenerator> {
        let retriever = Retriever::new(
            Arc::clone(&self.index),
            Arc::new(HashingEmbedder),
            RetrievalConfig {
                top_k: 3,
                score_threshold: Some(0.1),
                max_context_length: 4000,
            },
        );
        ChatService::new(retriever, Arc::clone(&self.generator))
    }

    async fn ingest_all(&self) {
        let paths = vec![
            self.path("rust.md"),
            self.path("scan.pdf"),
            self.path("garden.txt"),
        ];
        let report = self.ingestion().ingest(&paths, &CancelFlag::new()).await.unwrap();

        assert_eq!(report.files_processed, 2);
        assert_eq!(report.files_failed, 1);
        assert!(report.warnings[0].message.contains("pdf"));
    }
}

fn write(dir: &Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).unwrap();
}

#[tokio::test]
async fn test_grounded_answer_cites_matching_document() {
    let fixture = Fixture::new();
    fixture.ingest_all().await;
    let chat = fixture.chat();
    let mut session = Session::new();

    let answer = chat
        .ask(&mut session, "What does the borrow checker enforce?")
        .await;

    assert!(answer.grounded);
    assert!(answer.answer.contains("ownership"));
    assert_eq!(answer.sources, vec!["rust.md".to_string()]);
    assert_eq!(session.history.len(), 2);
    assert_eq!(session.history[1].sources, vec!["rust.md".to_string()]);

    let contexts = fixture.generator.contexts.lock().unwrap();
    assert!(contexts[0].starts_with("[Source 1: rust.md (relevance:"));
    assert!(!contexts[0].contains("**"));
}

#[tokio::test]
async fn test_unrelated_question_falls_back_without_generating() {
    let fixture = Fixture::new();
    fixture.ingest_all().await;
    let chat = fixture.chat();
    let mut session = Session::new();

    let answer = chat
        .ask(&mut session, "Explain quantum chromodynamics lattice calculations")
        .await;

    assert_eq!(answer.answer, FALLBACK_ANSWER);
    assert!(!answer.grounded);
    assert!(answer.sources.is_empty());
    assert_eq!(fixture.generator.calls(), 0);
}

#[tokio::test]
async fn test_streamed_answer_is_recorded_like_a_plain_one() {
    let fixture = Fixture::new();
    fixture.ingest_all().await;
    let chat = fixture.chat();
    let mut session = Session::new();

    let pending = chat.ask_stream(&session, "Who owns each value?").await;
    assert!(pending.needs_generation());

    let fragments: Vec<String> = chat
        .fragments(&pending)
        .map(|f| f.unwrap())
        .collect()
        .await;
    let text = fragments.concat();
    let shown = chat.finish_stream(&mut session, pending, &text);

    assert_eq!(shown, text);
    assert_eq!(session.history.len(), 2);
    assert_eq!(session.history[1].content, shown);
}

#[tokio::test]
async fn test_persisted_index_answers_after_reload() {
    let fixture = Fixture::new();
    fixture.ingest_all().await;
    let before = fixture.index.stats().await.unwrap();

    let reopened = FlatIndex::open(fixture.path("index.json"));
    reopened.load().await.unwrap();

    assert_eq!(reopened.stats().await.unwrap(), before);
    let query = HashingEmbedder::vector("borrow checker ownership");
    let original = fixture.index.search(&query, 1).await.unwrap();
    let reloaded = reopened.search(&query, 1).await.unwrap();
    assert_eq!(reloaded, original);
    assert_eq!(reloaded[0].filename(), Some("rust.md"));
}

#[tokio::test]
async fn test_cleared_index_stays_empty_after_reload() {
    let fixture = Fixture::new();
    fixture.ingest_all().await;

    fixture.index.clear().await.unwrap();
    fixture.index.persist().await.unwrap();

    let reopened = FlatIndex::open(fixture.path("index.json"));
    reopened.load().await.unwrap();
    assert!(reopened.stats().await.unwrap().is_empty());

    let mut session = Session::new();
    let answer = fixture
        .chat()
        .ask(&mut session, "What does the borrow checker enforce?")
        .await;
    assert_eq!(answer.answer, FALLBACK_ANSWER);
}
