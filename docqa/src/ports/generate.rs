use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use crate::domain::ChatMessage;
use crate::error::Result;

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions based on provided documents.

IMPORTANT RULES:
1. Answer questions ONLY using information from the provided context
2. If the answer is not in the documents, say that you couldn't find that information in the documents
3. Always cite which source document you're using when answering
4. Be concise and accurate
5. If you're not completely sure, acknowledge the uncertainty
6. Do not make up information or use external knowledge";

#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub question: &'a str,
    pub context: &'a str,
    pub history: &'a [ChatMessage],
}

impl<'a> GenerationRequest<'a> {
    pub const fn new(question: &'a str, context: &'a str, history: &'a [ChatMessage]) -> Self {
        Self {
            question,
            context,
            history,
        }
    }

    pub fn has_context(&self) -> bool {
        !self.context.trim().is_empty()
    }

    /// The final user turn: the question wrapped with its grounding context.
    pub fn user_message(&self) -> String {
        if self.has_context() {
            format!(
                "Context from documents:\n{}\n\nQuestion: {}\n\nPlease answer based on the context above.",
                self.context, self.question
            )
        } else {
            format!(
                "No relevant context found in the documents.\n\nQuestion: {}\n\nSince there is no context, say that the information was not found in the documents.",
                self.question
            )
        }
    }
}

#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String>;

    fn model_name(&self) -> &str;

    /// Yields the answer as text fragments until the stream ends or errors.
    ///
    /// Backends without native streaming yield the whole answer as one fragment.
    fn generate_stream<'a>(
        &'a self,
        request: GenerationRequest<'a>,
    ) -> BoxStream<'a, Result<String>> {
        stream::once(self.generate(request)).boxed()
    }
}
