use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::{Value, json};

use super::http::{self, LineEvent};
use super::openai::float_array;
use crate::error::{DocQaError, Result};
use crate::ports::{AnswerGenerator, EmbeddingGateway, GenerationRequest};

const PROVIDER: &str = "Ollama";

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/api/{path}", base_url.trim_end_matches('/'))
}

pub struct OllamaEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaEmbedder {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: http::client(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl EmbeddingGateway for OllamaEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = self
            .client
            .post(endpoint(&self.base_url, "embed"))
            .json(&json!({ "model": self.model, "input": texts }));

        let body = http::send_json(request, PROVIDER, DocQaError::Embedding).await?;
        body["embeddings"]
            .as_array()
            .ok_or_else(|| DocQaError::Embedding("Ollama response has no embeddings".to_string()))?
            .iter()
            .map(float_array)
            .collect()
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> Option<usize> {
        match self.model.split(':').next() {
            Some("nomic-embed-text") => Some(768),
            Some("mxbai-embed-large") => Some(1024),
            Some("all-minilm") => Some(384),
            _ => None,
        }
    }
}

pub struct OllamaGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaGenerator {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: http::client(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    fn post(&self, request: &GenerationRequest<'_>, stream: bool) -> reqwest::RequestBuilder {
        let body = json!({
            "model": self.model,
            "messages": http::with_system(http::conversation(request)),
            "stream": stream,
            "options": {
                "temperature": http::TEMPERATURE,
                "num_predict": http::MAX_TOKENS,
            },
        });
        self.client.post(endpoint(&self.base_url, "chat")).json(&body)
    }
}

#[async_trait]
impl AnswerGenerator for OllamaGenerator {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String> {
        let response = http::send_json(
            self.post(&request, false),
            PROVIDER,
            DocQaError::Generation,
        )
        .await?;

        response["message"]["content"]
            .as_str()
            .map(ToString::to_string)
            .ok_or_else(|| DocQaError::Generation("Ollama response has no message".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn generate_stream<'a>(
        &'a self,
        request: GenerationRequest<'a>,
    ) -> BoxStream<'a, Result<String>> {
        http::stream_answer(self.post(&request, true), PROVIDER, parse_stream_line)
    }
}

/// Ollama streams newline-delimited JSON objects rather than SSE.
fn parse_stream_line(line: &str) -> LineEvent {
    if line.trim().is_empty() {
        return LineEvent::Skip;
    }
    let event: Value = match serde_json::from_str(line) {
        Ok(event) => event,
        Err(e) => return LineEvent::Error(format!("Ollama sent an unreadable stream line: {e}")),
    };

    if let Some(message) = event["error"].as_str() {
        return LineEvent::Error(format!("Ollama stream error: {message}"));
    }
    match event["message"]["content"].as_str() {
        Some(text) if !text.is_empty() => LineEvent::Fragment(text.to_string()),
        _ if event["done"].as_bool() == Some(true) => LineEvent::Done,
        _ => LineEvent::Skip,
    }
}
