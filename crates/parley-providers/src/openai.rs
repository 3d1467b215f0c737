//! Hosted (OpenAI-style) chat completion backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use parley_core::ProviderError;

use crate::traits::{transport_error, ChatBackend, ChatMessage, ChatReply, ChatRequest};

/// Default OpenAI API base URL.
const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Hosted provider speaking the OpenAI chat completions API.
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
    timeout: Duration,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: build_client(DEFAULT_TIMEOUT),
            api_key: api_key.into(),
            base_url: OPENAI_API_URL.to_string(),
            default_model: "gpt-4o-mini".to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set a custom base URL (for OpenRouter, Azure, etc.).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
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

    /// Parse response into our format.
    fn parse_response(&self, response: OpenAIResponse) -> Result<ChatReply, ProviderError> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::malformed(self.id(), "response has no choices"))?;

        let usage = response.usage.unwrap_or_default();

        Ok(ChatReply {
            content: choice.message.content.unwrap_or_default(),
            completion_tokens: usage.completion_tokens,
            prompt_tokens: usage.prompt_tokens,
        })
    }
}

fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

#[async_trait]
impl ChatBackend for OpenAIProvider {
    fn id(&self) -> &str {
        "hosted"
    }

    fn name(&self) -> &str {
        "Hosted (OpenAI-compatible)"
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn chat(&self, request: ChatRequest) -> Result<ChatReply, ProviderError> {
        if !self.is_configured() {
            return Err(ProviderError::not_configured(self.id()));
        }

        let model = if request.model.is_empty() {
            &self.default_model
        } else {
            &request.model
        };

        let api_request = OpenAIRequest {
            model: model.to_string(),
            messages: request.messages,
            max_tokens: request.max_tokens,
        };

        debug!("Sending request to hosted chat completions API");

        let timeout_secs = self.timeout.as_secs();
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| transport_error(self.id(), timeout_secs, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("Hosted API error: {} - {}", status, error_text);
            return Err(ProviderError::api_error(
                self.id(),
                status.as_u16(),
                error_text,
            ));
        }

        let api_response: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| transport_error(self.id(), timeout_secs, e))?;
        self.parse_response(api_response)
    }
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_provider_metadata() {
        let provider = OpenAIProvider::new("test-key");
        assert_eq!(provider.id(), "hosted");
        assert!(provider.is_configured());
        assert!(!OpenAIProvider::new("").is_configured());
    }

    #[test]
    fn test_custom_base_url() {
        let provider =
            OpenAIProvider::new("test-key").with_base_url("https://openrouter.ai/api/v1/");
        assert_eq!(provider.base_url(), "https://openrouter.ai/api/v1");
    }

    #[tokio::test]
    async fn test_chat_reports_completion_tokens() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_partial_json(json!({"model": "gpt-4o-mini"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "- point one"}}],
                "usage": {"prompt_tokens": 40, "completion_tokens": 5, "total_tokens": 45}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenAIProvider::new("test-key").with_base_url(server.uri());
        let reply = provider
            .chat(ChatRequest::new(
                "gpt-4o-mini",
                vec![ChatMessage::user("Summarize this")],
            ))
            .await
            .unwrap();

        assert_eq!(reply.content, "- point one");
        assert_eq!(reply.completion_tokens, Some(5));
        assert_eq!(reply.prompt_tokens, Some(40));
    }

    #[tokio::test]
    async fn test_chat_maps_error_status() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let provider = OpenAIProvider::new("test-key").with_base_url(server.uri());
        let err = provider
            .chat(ChatRequest::new("", vec![ChatMessage::user("hi")]))
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::ApiError { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_chat_rejects_empty_choices() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let provider = OpenAIProvider::new("test-key").with_base_url(server.uri());
        let err = provider
            .chat(ChatRequest::new("", vec![ChatMessage::user("hi")]))
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_unconfigured_provider_fails_fast() {
        let provider = OpenAIProvider::new("");
        let err = provider
            .chat(ChatRequest::new("", vec![ChatMessage::user("hi")]))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured { .. }));
    }
}
