use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::{Value, json};

use super::http::{self, LineEvent};
use crate::error::{DocQaError, Result};
use crate::ports::{AnswerGenerator, EmbeddingGateway, GenerationRequest};

const BASE_URL: &str = "https://api.openai.com/v1";
const PROVIDER: &str = "OpenAI";

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: http::client(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl EmbeddingGateway for OpenAiEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = self
            .client
            .post(format!("{BASE_URL}/embeddings"))
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.model, "input": texts }));

        let body = http::send_json(request, PROVIDER, DocQaError::Embedding).await?;
        parse_embeddings(&body)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> Option<usize> {
        match self.model.as_str() {
            "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
            "text-embedding-3-large" => Some(3072),
            _ => None,
        }
    }
}

/// Vectors from an embeddings response, ordered by their `index` field.
fn parse_embeddings(body: &Value) -> Result<Vec<Vec<f32>>> {
    let data = body["data"]
        .as_array()
        .ok_or_else(|| DocQaError::Embedding("OpenAI response has no data".to_string()))?;

    let mut indexed = data
        .iter()
        .enumerate()
        .map(|(position, item)| {
            let index = item["index"]
                .as_u64()
                .map_or(position, |i| usize::try_from(i).unwrap_or(position));
            float_array(&item["embedding"]).map(|vector| (index, vector))
        })
        .collect::<Result<Vec<_>>>()?;
    indexed.sort_by_key(|(index, _)| *index);

    Ok(indexed.into_iter().map(|(_, vector)| vector).collect())
}

pub(crate) fn float_array(value: &Value) -> Result<Vec<f32>> {
    value
        .as_array()
        .ok_or_else(|| DocQaError::Embedding("embedding is not an array".to_string()))?
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| DocQaError::Embedding("embedding holds a non-number".to_string()))
        })
        .collect()
}

pub struct OpenAiGenerator {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: http::client(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    fn body(&self, request: &GenerationRequest<'_>, stream: bool) -> Value {
        json!({
            "model": self.model,
            "messages": http::with_system(http::conversation(request)),
            "temperature": http::TEMPERATURE,
            "max_tokens": http::MAX_TOKENS,
            "stream": stream,
        })
    }

    fn post(&self, body: &Value) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{BASE_URL}/chat/completions"))
            .bearer_auth(&self.api_key)
            .json(body)
    }
}

#[async_trait]
impl AnswerGenerator for OpenAiGenerator {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String> {
        let body = self.body(&request, false);
        let response = http::send_json(self.post(&body), PROVIDER, DocQaError::Generation).await?;

        response["choices"][0]["message"]["content"]
            .as_str()
            .map(ToString::to_string)
            .ok_or_else(|| DocQaError::Generation("OpenAI response has no content".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn generate_stream<'a>(
        &'a self,
        request: GenerationRequest<'a>,
    ) -> BoxStream<'a, Result<String>> {
        let body = self.body(&request, true);
        http::stream_answer(self.post(&body), PROVIDER, parse_stream_line)
    }
}

/// One SSE line of a streamed chat completion.
pub(crate) fn parse_stream_line(line: &str) -> LineEvent {
    let Some(data) = http::sse_data(line) else {
        return LineEvent::Skip;
    };
    if data == "[DONE]" {
        return LineEvent::Done;
    }

    match serde_json::from_str::<Value>(data) {
        Ok(event) => {
            if let Some(message) = event["error"]["message"].as_str() {
                return LineEvent::Error(format!("OpenAI stream error: {message}"));
            }
            event["choices"][0]["delta"]["content"]
                .as_str()
                .map_or(LineEvent::Skip, |text| LineEvent::Fragment(text.to_string()))
        }
        Err(e) => LineEvent::Error(format!("OpenAI sent an unreadable stream event: {e}")),
    }
}
