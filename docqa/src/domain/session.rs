use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SessionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            sources: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>, sources: Vec<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            sources,
        }
    }
}

/// Conversation state for one user, passed explicitly into the chat service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    pub history: Vec<ChatMessage>,
    pub processed_files: Vec<String>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: SessionId::generate(),
            created_at: Utc::now(),
            history: Vec::new(),
            processed_files: Vec::new(),
        }
    }

    /// Starts a new conversation, keeping the record of processed files.
    pub fn reset(&mut self) {
        self.id = SessionId::generate();
        self.created_at = Utc::now();
        self.history.clear();
    }

    /// Forgets everything tied to the indexed documents.
    pub fn clear_documents(&mut self) {
        self.reset();
        self.processed_files.clear();
    }

    pub fn record_exchange(&mut self, question: &str, answer: &str, sources: Vec<String>) {
        self.history.push(ChatMessage::user(question));
        self.history.push(ChatMessage::assistant(answer, sources));
    }

    pub fn mark_processed(&mut self, filename: impl Into<String>) {
        let filename = filename.into();
        if !self.processed_files.contains(&filename) {
            self.processed_files.push(filename);
        }
    }

    pub fn has_documents(&self) -> bool {
        !self.processed_files.is_empty()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
