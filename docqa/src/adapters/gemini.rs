use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::{Value, json};

use super::http::{self, LineEvent};
use super::openai::float_array;
use crate::domain::Role;
use crate::error::{DocQaError, Result};
use crate::ports::generate::SYSTEM_PROMPT;
use crate::ports::{AnswerGenerator, EmbeddingGateway, GenerationRequest};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const PROVIDER: &str = "Gemini";

fn model_path(model: &str) -> String {
    format!("models/{}", model.trim_start_matches("models/"))
}

pub struct GeminiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiEmbedder {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: http::client(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl EmbeddingGateway for GeminiEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = model_path(&self.model);
        let requests: Vec<Value> = texts
            .iter()
            .map(|text| json!({ "model": model, "content": { "parts": [{ "text": text }] } }))
            .collect();

        let request = self
            .client
            .post(format!("{BASE_URL}/{model}:batchEmbedContents"))
            .header("x-goog-api-key", &self.api_key)
            .json(&json!({ "requests": requests }));

        let body = http::send_json(request, PROVIDER, DocQaError::Embedding).await?;
        body["embeddings"]
            .as_array()
            .ok_or_else(|| DocQaError::Embedding("Gemini response has no embeddings".to_string()))?
            .iter()
            .map(|embedding| float_array(&embedding["values"]))
            .collect()
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> Option<usize> {
        match self.model.trim_start_matches("models/") {
            "embedding-001" | "text-embedding-004" => Some(768),
            _ => None,
        }
    }
}

pub struct GeminiGenerator {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiGenerator {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: http::client(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    fn post(&self, action: &str, body: &Value) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{BASE_URL}/{}:{action}", model_path(&self.model)))
            .header("x-goog-api-key", &self.api_key)
            .json(body)
    }
}

/// Gemini names the assistant turn `model` and takes the system prompt separately.
fn request_body(request: &GenerationRequest<'_>) -> Value {
    let mut contents: Vec<Value> = request
        .history
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "model",
            };
            json!({ "role": role, "parts": [{ "text": m.content }] })
        })
        .collect();
    contents.push(json!({ "role": "user", "parts": [{ "text": request.user_message() }] }));

    json!({
        "systemInstruction": { "parts": [{ "text": SYSTEM_PROMPT }] },
        "contents": contents,
        "generationConfig": {
            "temperature": http::TEMPERATURE,
            "maxOutputTokens": http::MAX_TOKENS,
        },
    })
}

/// Concatenated text parts of the first candidate.
fn candidate_text(response: &Value) -> Option<String> {
    let parts = response["candidates"][0]["content"]["parts"].as_array()?;
    Some(parts.iter().filter_map(|p| p["text"].as_str()).collect())
}

#[async_trait]
impl AnswerGenerator for GeminiGenerator {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String> {
        let body = request_body(&request);
        let response = http::send_json(
            self.post("generateContent", &body),
            PROVIDER,
            DocQaError::Generation,
        )
        .await?;

        candidate_text(&response).ok_or_else(|| {
            let reason = response["promptFeedback"]["blockReason"]
                .as_str()
                .unwrap_or("empty response");
            DocQaError::Generation(format!("Gemini returned no answer ({reason})"))
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn generate_stream<'a>(
        &'a self,
        request: GenerationRequest<'a>,
    ) -> BoxStream<'a, Result<String>> {
        let body = request_body(&request);
        let request = self
            .post("streamGenerateContent", &body)
            .query(&[("alt", "sse")]);
        http::stream_answer(request, PROVIDER, parse_stream_line)
    }
}

fn parse_stream_line(line: &str) -> LineEvent {
    let Some(data) = http::sse_data(line) else {
        return LineEvent::Skip;
    };

    match serde_json::from_str::<Value>(data) {
        Ok(event) => {
            if let Some(message) = event["error"]["message"].as_str() {
                return LineEvent::Error(format!("Gemini stream error: {message}"));
            }
            candidate_text(&event).map_or(LineEvent::Skip, LineEvent::Fragment)
        }
        Err(e) => LineEvent::Error(format!("Gemini sent an unreadable stream event: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::domain::ChatMessage;

    #[test]
    fn test_model_path_is_normalized() {
        assert_eq!(model_path("embedding-001"), "models/embedding-001");
        assert_eq!(model_path("models/embedding-001"), "models/embedding-001");
    }

    #[test]
    fn test_assistant_turns_use_model_role() {
        let history = vec![
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello", Vec::new()),
        ];
        let body = request_body(&GenerationRequest::new("q", "ctx", &history));
        let contents = body["contents"].as_array().unwrap();

        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["role"], "user");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 1000);
    }

    #[test]
    fn test_candidate_parts_are_joined() {
        let response = json!({
            "candidates": [{ "content": { "parts": [{ "text": "Hello, " }, { "text": "world" }] } }]
        });
        assert_eq!(candidate_text(&response).as_deref(), Some("Hello, world"));
        assert_eq!(candidate_text(&json!({ "candidates": [] })), None);
    }

    #[test]
    fn test_stream_line() {
        let line = r#"data: {"candidates":[{"content":{"parts":[{"text":"Hi"}]}}]}"#;
        assert_eq!(parse_stream_line(line), LineEvent::Fragment("Hi".to_string()));
        assert_eq!(parse_stream_line(""), LineEvent::Skip);
    }
}
