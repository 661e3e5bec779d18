use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::{Value, json};

use super::http::{self, LineEvent};
use crate::error::{DocQaError, Result};
use crate::ports::generate::SYSTEM_PROMPT;
use crate::ports::{AnswerGenerator, GenerationRequest};

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;
const PROVIDER: &str = "Anthropic";

pub struct AnthropicGenerator {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl AnthropicGenerator {
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
            "max_tokens": MAX_TOKENS,
            "temperature": http::TEMPERATURE,
            "system": SYSTEM_PROMPT,
            "messages": http::conversation(request),
            "stream": stream,
        })
    }

    fn post(&self, body: &Value) -> reqwest::RequestBuilder {
        self.client
            .post(MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(body)
    }
}

#[async_trait]
impl AnswerGenerator for AnthropicGenerator {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String> {
        let body = self.body(&request, false);
        let response = http::send_json(self.post(&body), PROVIDER, DocQaError::Generation).await?;

        let blocks = response["content"]
            .as_array()
            .ok_or_else(|| DocQaError::Generation("Anthropic response has no content".to_string()))?;
        Ok(blocks
            .iter()
            .filter(|block| block["type"] == "text")
            .filter_map(|block| block["text"].as_str())
            .collect())
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

fn parse_stream_line(line: &str) -> LineEvent {
    let Some(data) = http::sse_data(line) else {
        return LineEvent::Skip;
    };
    let event: Value = match serde_json::from_str(data) {
        Ok(event) => event,
        Err(e) => return LineEvent::Error(format!("Anthropic sent an unreadable stream event: {e}")),
    };

    match event["type"].as_str() {
        Some("content_block_delta") => event["delta"]["text"]
            .as_str()
            .map_or(LineEvent::Skip, |text| LineEvent::Fragment(text.to_string())),
        Some("message_stop") => LineEvent::Done,
        Some("error") => LineEvent::Error(format!(
            "Anthropic stream error: {}",
            event["error"]["message"].as_str().unwrap_or("unknown")
        )),
        _ => LineEvent::Skip,
    }
}
