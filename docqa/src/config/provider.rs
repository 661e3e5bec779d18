use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DocQaError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    #[default]
    FastEmbed,
    OpenAi,
    Gemini,
    Ollama,
}

impl EmbeddingProvider {
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::FastEmbed => "all-minilm-l6-v2",
            Self::OpenAi => "text-embedding-3-small",
            Self::Gemini => "embedding-001",
            Self::Ollama => "nomic-embed-text",
        }
    }
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fastembed" | "local" => Ok(Self::FastEmbed),
            "openai" => Ok(Self::OpenAi),
            "gemini" | "google" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            _ => Err(format!("Unknown embedding provider: {s}")),
        }
    }
}

impl fmt::Display for EmbeddingProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FastEmbed => "fastembed",
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::Ollama => "ollama",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatProvider {
    OpenAi,
    #[default]
    Gemini,
    Anthropic,
    Ollama,
}

impl ChatProvider {
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o",
            Self::Gemini => "gemini-1.5-flash",
            Self::Anthropic => "claude-3-5-sonnet-20241022",
            Self::Ollama => "llama3.1",
        }
    }
}

impl std::str::FromStr for ChatProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "gemini" | "google" => Ok(Self::Gemini),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            _ => Err(format!("Unknown chat provider: {s}")),
        }
    }
}

impl fmt::Display for ChatProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub embedding: EmbeddingProvider,
    pub chat: ChatProvider,
    pub embedding_model: Option<String>,
    pub chat_model: Option<String>,
    pub ollama_url: String,
    pub openai_api_key: Option<String>,
    pub google_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            embedding: EmbeddingProvider::default(),
            chat: ChatProvider::default(),
            embedding_model: None,
            chat_model: None,
            ollama_url: "http://localhost:11434".to_string(),
            openai_api_key: None,
            google_api_key: None,
            anthropic_api_key: None,
        }
    }
}

impl ProviderConfig {
    pub fn embedding_model(&self) -> &str {
        self.embedding_model
            .as_deref()
            .unwrap_or_else(|| self.embedding.default_model())
    }

    pub fn chat_model(&self) -> &str {
        self.chat_model
            .as_deref()
            .unwrap_or_else(|| self.chat.default_model())
    }

    pub fn embedding_api_key(&self) -> Result<Option<&str>> {
        match self.embedding {
            EmbeddingProvider::FastEmbed | EmbeddingProvider::Ollama => Ok(None),
            EmbeddingProvider::OpenAi => {
                require(self.openai_api_key.as_deref(), "OPENAI_API_KEY").map(Some)
            }
            EmbeddingProvider::Gemini => {
                require(self.google_api_key.as_deref(), "GOOGLE_API_KEY").map(Some)
            }
        }
    }

    pub fn chat_api_key(&self) -> Result<Option<&str>> {
        match self.chat {
            ChatProvider::Ollama => Ok(None),
            ChatProvider::OpenAi => {
                require(self.openai_api_key.as_deref(), "OPENAI_API_KEY").map(Some)
            }
            ChatProvider::Gemini => {
                require(self.google_api_key.as_deref(), "GOOGLE_API_KEY").map(Some)
            }
            ChatProvider::Anthropic => {
                require(self.anthropic_api_key.as_deref(), "ANTHROPIC_API_KEY").map(Some)
            }
        }
    }

    /// Fails with a user-facing message naming the first missing credential.
    pub fn require_credentials(&self) -> Result<()> {
        self.embedding_api_key()?;
        self.chat_api_key()?;
        Ok(())
    }
}

fn require<'a>(key: Option<&'a str>, name: &str) -> Result<&'a str> {
    key.filter(|k| !k.trim().is_empty()).ok_or_else(|| {
        DocQaError::Config(format!(
            "API key not found, set {name} in your environment or config file"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_names_roundtrip() {
        for provider in [
            EmbeddingProvider::FastEmbed,
            EmbeddingProvider::OpenAi,
            EmbeddingProvider::Gemini,
            EmbeddingProvider::Ollama,
        ] {
            assert_eq!(provider.to_string().parse::<EmbeddingProvider>(), Ok(provider));
        }
        assert_eq!("Claude".parse::<ChatProvider>(), Ok(ChatProvider::Anthropic));
        assert!("anthropic".parse::<EmbeddingProvider>().is_err());
    }

    #[test]
    fn test_missing_credentials_name_the_key() {
        let config = ProviderConfig {
            embedding: EmbeddingProvider::OpenAi,
            ..ProviderConfig::default()
        };
        let err = config.require_credentials().unwrap_err();
        assert!(matches!(err, DocQaError::Config(msg) if msg.contains("OPENAI_API_KEY")));
    }

    #[test]
    fn test_local_providers_need_no_credentials() {
        let config = ProviderConfig {
            embedding: EmbeddingProvider::FastEmbed,
            chat: ChatProvider::Ollama,
            ..ProviderConfig::default()
        };
        assert!(config.require_credentials().is_ok());
    }

    #[test]
    fn test_blank_key_counts_as_missing() {
        let config = ProviderConfig {
            chat: ChatProvider::Anthropic,
            embedding: EmbeddingProvider::Ollama,
            anthropic_api_key: Some("  ".to_string()),
            ..ProviderConfig::default()
        };
        assert!(config.require_credentials().is_err());
    }
}
