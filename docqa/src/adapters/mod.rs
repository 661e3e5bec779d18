//! Concrete backends for the ports, selected from configuration.

pub mod anthropic;
pub mod flat_index;
pub mod gemini;
mod http;
#[cfg(feature = "fastembed")]
pub mod local;
pub mod ollama;
pub mod openai;
pub mod text_extractor;

use async_trait::async_trait;
use futures::stream::BoxStream;

pub use anthropic::AnthropicGenerator;
pub use flat_index::FlatIndex;
pub use gemini::{GeminiEmbedder, GeminiGenerator};
#[cfg(feature = "fastembed")]
pub use local::FastEmbedder;
pub use ollama::{OllamaEmbedder, OllamaGenerator};
pub use openai::{OpenAiEmbedder, OpenAiGenerator};
pub use text_extractor::TextExtractor;

use crate::config::{ChatProvider, EmbeddingProvider, ProviderConfig};
use crate::error::{DocQaError, Result};
use crate::ports::{AnswerGenerator, EmbeddingGateway, GenerationRequest};

pub enum Embedder {
    #[cfg(feature = "fastembed")]
    Local(FastEmbedder),
    OpenAi(OpenAiEmbedder),
    Gemini(GeminiEmbedder),
    Ollama(OllamaEmbedder),
}

impl Embedder {
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let model = config.embedding_model();
        match config.embedding {
            #[cfg(feature = "fastembed")]
            EmbeddingProvider::FastEmbed => {
                let cache_dir = directories::ProjectDirs::from("", "", "docqa")
                    .map(|d| d.cache_dir().join("models"));
                Ok(Self::Local(FastEmbedder::new(model, cache_dir)?))
            }
            #[cfg(not(feature = "fastembed"))]
            EmbeddingProvider::FastEmbed => Err(DocQaError::Config(
                "local embeddings need the `fastembed` feature, pick another embedding provider"
                    .to_string(),
            )),
            EmbeddingProvider::OpenAi => Ok(Self::OpenAi(OpenAiEmbedder::new(
                api_key(config.embedding_api_key()?)?,
                model,
            ))),
            EmbeddingProvider::Gemini => Ok(Self::Gemini(GeminiEmbedder::new(
                api_key(config.embedding_api_key()?)?,
                model,
            ))),
            EmbeddingProvider::Ollama => Ok(Self::Ollama(OllamaEmbedder::new(
                config.ollama_url.as_str(),
                model,
            ))),
        }
    }

    fn inner(&self) -> &dyn EmbeddingGateway {
        match self {
            #[cfg(feature = "fastembed")]
            Self::Local(e) => e,
            Self::OpenAi(e) => e,
            Self::Gemini(e) => e,
            Self::Ollama(e) => e,
        }
    }
}

#[async_trait]
impl EmbeddingGateway for Embedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.inner().embed_batch(texts).await
    }

    fn model_name(&self) -> &str {
        self.inner().model_name()
    }

    fn dimension(&self) -> Option<usize> {
        self.inner().dimension()
    }
}

pub enum Generator {
    OpenAi(OpenAiGenerator),
    Gemini(GeminiGenerator),
    Anthropic(AnthropicGenerator),
    Ollama(OllamaGenerator),
}

impl Generator {
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let model = config.chat_model();
        match config.chat {
            ChatProvider::OpenAi => Ok(Self::OpenAi(OpenAiGenerator::new(
                api_key(config.chat_api_key()?)?,
                model,
            ))),
            ChatProvider::Gemini => Ok(Self::Gemini(GeminiGenerator::new(
                api_key(config.chat_api_key()?)?,
                model,
            ))),
            ChatProvider::Anthropic => Ok(Self::Anthropic(AnthropicGenerator::new(
                api_key(config.chat_api_key()?)?,
                model,
            ))),
            ChatProvider::Ollama => Ok(Self::Ollama(OllamaGenerator::new(
                config.ollama_url.as_str(),
                model,
            ))),
        }
    }

    fn inner(&self) -> &dyn AnswerGenerator {
        match self {
            Self::OpenAi(g) => g,
            Self::Gemini(g) => g,
            Self::Anthropic(g) => g,
            Self::Ollama(g) => g,
        }
    }
}

#[async_trait]
impl AnswerGenerator for Generator {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String> {
        self.inner().generate(request).await
    }

    fn model_name(&self) -> &str {
        self.inner().model_name()
    }

    fn generate_stream<'a>(
        &'a self,
        request: GenerationRequest<'a>,
    ) -> BoxStream<'a, Result<String>> {
        self.inner().generate_stream(request)
    }
}

fn api_key(key: Option<&str>) -> Result<&str> {
    key.ok_or_else(|| DocQaError::Config("provider requires an API key".to_string()))
}
