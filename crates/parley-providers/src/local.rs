//! Local model provider (Ollama) implementation.
//!
//! Talks to Ollama's native `/api/chat` endpoint rather than its
//! OpenAI-compatible layer, because only the native reply carries
//! `prompt_eval_count`, the exact tokenized prompt size.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use parley_core::ProviderError;

use crate::traits::{transport_error, ChatBackend, ChatMessage, ChatReply, ChatRequest};

/// Default Ollama API URL.
const OLLAMA_API_URL: &str = "http://localhost:11434";

/// Default request timeout. Local models can be slow to load.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Local provider for Ollama models.
pub struct LocalProvider {
    client: Client,
    /// Base URL for Ollama API, without a trailing `/v1`
    base_url: String,
    default_model: String,
    timeout: Duration,
}

impl LocalProvider {
    /// Create a new local provider connecting to Ollama.
    pub fn new() -> Self {
        Self::with_url(OLLAMA_API_URL)
    }

    /// Create with a custom Ollama URL.
    pub fn with_url(url: impl Into<String>) -> Self {
        let url = url.into();
        let base_url = url
            .trim_end_matches('/')
            .trim_end_matches("/v1")
            .to_string();

        Self {
            client: build_client(DEFAULT_TIMEOUT),
            base_url,
            default_model: "llama3.2".to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the default model.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_client(timeout);
        self.timeout = timeout;
        self
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check if Ollama is running.
    pub async fn is_running(&self) -> bool {
        match self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// List available models from Ollama.
    pub async fn list_models(&self) -> Result<Vec<OllamaModel>, ProviderError> {
        let timeout_secs = self.timeout.as_secs();
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(|e| transport_error(self.id(), timeout_secs, e))?;

        if !response.status().is_success() {
            return Err(ProviderError::api_error(
                self.id(),
                response.status().as_u16(),
                "Failed to list Ollama models",
            ));
        }

        let tags: OllamaTags = response
            .json()
            .await
            .map_err(|e| transport_error(self.id(), timeout_secs, e))?;
        Ok(tags.models)
    }
}

impl Default for LocalProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

#[async_trait]
impl ChatBackend for LocalProvider {
    fn id(&self) -> &str {
        "local"
    }

    fn name(&self) -> &str {
        "Local (Ollama)"
    }

    fn is_configured(&self) -> bool {
        // Actual availability is checked via is_running()
        true
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn chat(&self, request: ChatRequest) -> Result<ChatReply, ProviderError> {
        let model = if request.model.is_empty() {
            &self.default_model
        } else {
            &request.model
        };

        let api_request = OllamaChatRequest {
            model: model.to_string(),
            messages: request.messages,
            stream: false,
            options: request.max_tokens.map(|n| OllamaOptions { num_predict: n }),
        };

        debug!("Sending request to Ollama");

        let timeout_secs = self.timeout.as_secs();
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&api_request)
            .send()
            .await
            .map_err(|e| transport_error(self.id(), timeout_secs, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("Ollama error: {} - {}", status, error_text);
            return Err(ProviderError::api_error(
                self.id(),
                status.as_u16(),
                error_text,
            ));
        }

        let reply: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| transport_error(self.id(), timeout_secs, e))?;

        Ok(ChatReply {
            content: reply.message.content,
            completion_tokens: reply.eval_count,
            prompt_tokens: reply.prompt_eval_count,
        })
    }
}

// Ollama-specific types

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaReplyMessage,
    eval_count: Option<u32>,
    prompt_eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaReplyMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaTags {
    models: Vec<OllamaModel>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OllamaModel {
    pub name: String,
    #[serde(default)]
    pub modified_at: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub digest: String,
}
