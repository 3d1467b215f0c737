//! Backend trait definitions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use parley_core::{Message, ProviderError, Role};

/// A single chat turn on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        Self::new(message.role, message.content.clone())
    }
}

/// Non-streaming chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Model to use; empty selects the backend's default model
    pub model: String,
    /// Conversation turns
    pub messages: Vec<ChatMessage>,
    /// Generation cap
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Typed reply from a chat backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    /// Generated text
    pub content: String,
    /// Tokens generated, if the backend reported them
    pub completion_tokens: Option<u32>,
    /// Tokens in the tokenized prompt, if the backend reported them
    pub prompt_tokens: Option<u32>,
}

/// Core backend trait - every inference backend implements this.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Backend identifier.
    fn id(&self) -> &str;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// Check if the backend is configured and ready.
    fn is_configured(&self) -> bool;

    /// Send a chat request and wait for the full reply.
    async fn chat(&self, request: ChatRequest) -> Result<ChatReply, ProviderError>;
}

/// Map a transport error to a provider error.
pub(crate) fn transport_error(
    provider: &str,
    timeout_secs: u64,
    err: reqwest::Error,
) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout {
            provider: provider.to_string(),
            seconds: timeout_secs,
        }
    } else if err.is_decode() {
        ProviderError::malformed(provider, err.to_string())
    } else {
        ProviderError::NetworkError {
            provider: provider.to_string(),
            message: err.to_string(),
        }
    }
}
