use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use serde::Serialize;
use tracing::{debug, warn};

use super::retrieval::{Retriever, get_relevant_sources};
use crate::domain::{ChatMessage, SearchResult, Session};
use crate::error::{DocQaError, Result};
use crate::ports::{AnswerGenerator, EmbeddingGateway, GenerationRequest, VectorIndex};

pub const FALLBACK_ANSWER: &str = "I couldn't find that information in your documents.";
pub const EMPTY_QUESTION_ANSWER: &str = "Please ask a question.";

const UNCERTAINTY_PHRASES: [&str; 7] = [
    "i don't know",
    "not mentioned",
    "no information",
    "cannot find",
    "not found",
    "doesn't say",
    "not provided",
];
const MIN_ANSWER_CHARS: usize = 10;
/// Most recent messages replayed to the generator.
const HISTORY_WINDOW: usize = 10;

/// True when a generated answer hedges or is too short to be an answer.
pub fn is_uncertain(answer: &str) -> bool {
    let trimmed = answer.trim();
    if trimmed.chars().count() < MIN_ANSWER_CHARS {
        return true;
    }
    let lowered = trimmed.to_lowercase();
    UNCERTAINTY_PHRASES.iter().any(|p| lowered.contains(p))
}

/// The caller-visible answer: the generated text, or the fallback message
/// when there was no context or the text is uncertain.
pub fn apply_not_found_policy(answer: &str, has_context: bool) -> Option<&str> {
    (has_context && !is_uncertain(answer)).then_some(answer)
}

pub fn generation_error_text(error: &DocQaError) -> String {
    format!("Error generating response: {error}")
}

fn retrieval_error_text(error: &DocQaError) -> String {
    format!("Error retrieving context: {error}")
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatAnswer {
    pub answer: String,
    pub sources: Vec<String>,
    pub results: Vec<SearchResult>,
    pub num_chunks: usize,
    /// Whether `answer` came from the generator rather than a fixed message.
    pub grounded: bool,
}

impl ChatAnswer {
    fn fixed(answer: impl Into<String>, results: Vec<SearchResult>) -> Self {
        Self {
            answer: answer.into(),
            sources: get_relevant_sources(&results),
            num_chunks: results.len(),
            results,
            grounded: false,
        }
    }
}

enum Pending {
    Generate {
        question: String,
        context: String,
        history: Vec<ChatMessage>,
    },
    /// No usable context; answered with the fallback and still recorded.
    Fallback { question: String },
    /// Blank question or failed retrieval; shown but never recorded.
    Notice(String),
}

/// Retrieval done, generation not yet started.
///
/// Stream it with [`ChatService::fragments`] and hand the accumulated text
/// to [`ChatService::finish_stream`].
pub struct StreamingAnswer {
    pub sources: Vec<String>,
    pub results: Vec<SearchResult>,
    pending: Pending,
}

impl StreamingAnswer {
    pub const fn needs_generation(&self) -> bool {
        matches!(self.pending, Pending::Generate { .. })
    }
}

pub struct ChatService<I, E, G>
where
    I: VectorIndex,
    E: EmbeddingGateway,
    G: AnswerGenerator,
{
    retriever: Retriever<I, E>,
    generator: Arc<G>,
}

impl<I, E, G> ChatService<I, E, G>
where
    I: VectorIndex,
    E: EmbeddingGateway,
    G: AnswerGenerator,
{
    pub const fn new(retriever: Retriever<I, E>, generator: Arc<G>) -> Self {
        Self {
            retriever,
            generator,
        }
    }

    pub const fn retriever(&self) -> &Retriever<I, E> {
        &self.retriever
    }

    /// Answers `question` from the indexed documents and records the exchange.
    ///
    /// Failures are reported in the answer text and leave the history untouched.
    pub async fn ask(&self, session: &mut Session, question: &str) -> ChatAnswer {
        let prepared = self.prepare(session, question).await;
        let results = prepared.results;

        match prepared.pending {
            Pending::Notice(text) => ChatAnswer::fixed(text, results),
            Pending::Fallback { question } => {
                session.record_exchange(&question, FALLBACK_ANSWER, Vec::new());
                ChatAnswer::fixed(FALLBACK_ANSWER, results)
            }
            Pending::Generate {
                question,
                context,
                history,
            } => {
                let request = GenerationRequest::new(&question, &context, &history);
                match self.generator.generate(request).await {
                    Ok(text) => {
                        let grounded = apply_not_found_policy(&text, true).is_some();
                        let answer = if grounded { text } else { FALLBACK_ANSWER.to_string() };
                        session.record_exchange(&question, &answer, prepared.sources.clone());
                        ChatAnswer {
                            answer,
                            sources: prepared.sources,
                            num_chunks: results.len(),
                            results,
                            grounded,
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "generation failed");
                        ChatAnswer::fixed(generation_error_text(&e), results)
                    }
                }
            }
        }
    }

    /// Retrieves context for a streamed answer.
    pub async fn ask_stream(&self, session: &Session, question: &str) -> StreamingAnswer {
        self.prepare(session, question).await
    }

    /// Answer fragments in order. Fixed answers arrive as a single fragment;
    /// a generation failure ends the stream with an `Err`.
    pub fn fragments<'a>(&'a self, answer: &'a StreamingAnswer) -> BoxStream<'a, Result<String>> {
        match &answer.pending {
            Pending::Generate {
                question,
                context,
                history,
            } => self
                .generator
                .generate_stream(GenerationRequest::new(question, context, history)),
            Pending::Fallback { .. } => {
                stream::once(async { Ok::<_, DocQaError>(FALLBACK_ANSWER.to_string()) }).boxed()
            }
            Pending::Notice(text) => {
                stream::once(async move { Ok::<_, DocQaError>(text.clone()) }).boxed()
            }
        }
    }

    /// Applies the not-found policy to the streamed `text` and records the
    /// exchange. Returns the answer to show, which differs from `text` when
    /// the policy replaced it.
    pub fn finish_stream(&self, session: &mut Session, answer: StreamingAnswer, text: &str) -> String {
        match answer.pending {
            Pending::Notice(notice) => notice,
            Pending::Fallback { question } => {
                session.record_exchange(&question, FALLBACK_ANSWER, Vec::new());
                FALLBACK_ANSWER.to_string()
            }
            Pending::Generate { question, .. } => {
                let shown = apply_not_found_policy(text, true).unwrap_or(FALLBACK_ANSWER);
                session.record_exchange(&question, shown, answer.sources);
                shown.to_string()
            }
        }
    }

    async fn prepare(&self, session: &Session, question: &str) -> StreamingAnswer {
        let question = question.trim();
        if question.is_empty() {
            return notice(EMPTY_QUESTION_ANSWER.to_string());
        }

        let results = match self.retriever.retrieve_configured(question).await {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, "retrieval failed");
                return notice(retrieval_error_text(&e));
            }
        };

        let context = self.retriever.context(&results);
        debug!(
            excerpts = context.excerpts().len(),
            chars = context.packed_len(),
            truncated = context.is_truncated(),
            "context packed"
        );

        let sources = get_relevant_sources(&results);
        let question = question.to_string();
        let pending = if context.is_empty() {
            Pending::Fallback { question }
        } else {
            let start = session.history.len().saturating_sub(HISTORY_WINDOW);
            Pending::Generate {
                question,
                context: context.render(),
                history: session.history[start..].to_vec(),
            }
        };

        StreamingAnswer {
            sources,
            results,
            pending,
        }
    }
}

/// Holds streamed text back while the not-found policy would still replace it.
///
/// Fragments are released once the accumulated answer is long enough and free
/// of hedging phrases; after that they pass straight through. A hedge that
/// only shows up later can still make `finish_stream` replace the answer.
#[derive(Debug, Default)]
pub struct StreamGate {
    text: String,
    released: bool,
}

impl StreamGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text that may be shown now, if any.
    pub fn push(&mut self, fragment: &str) -> Option<String> {
        self.text.push_str(fragment);
        if self.released {
            return Some(fragment.to_string());
        }
        if is_uncertain(&self.text) {
            return None;
        }
        self.released = true;
        Some(self.text.clone())
    }

    pub const fn is_released(&self) -> bool {
        self.released
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

fn notice(text: String) -> StreamingAnswer {
    StreamingAnswer {
        sources: Vec::new(),
        results: Vec::new(),
        pending: Pending::Notice(text),
    }
}
