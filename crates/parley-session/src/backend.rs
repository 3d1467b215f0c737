//! Model capabilities used by compaction.
//!
//! A [`CompactionBackend`] wraps a chat backend with the two things the
//! engine needs from a model: a summary with its token cost, and a token
//! count for an active message set. Hosted and local providers report
//! these differently, so each gets its own adapter.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use parley_core::{CompactionConfig, Message, ProviderError, ProviderKind};
use parley_providers::{ChatBackend, ChatMessage, ChatRequest, ProviderRegistry};

use crate::context::{count_words, TokenCount, TokenEstimator};
use crate::summarizer::SummaryPrompt;

/// A summary produced by a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedSummary {
    pub text: String,
    pub token_count: u32,
}

/// What compaction needs from a conversation's model.
#[async_trait]
pub trait CompactionBackend: Send + Sync {
    /// Provider kind this backend serves.
    fn kind(&self) -> ProviderKind;

    /// Generate a summary for a prepared prompt.
    async fn summarize(
        &self,
        model: &str,
        prompt: &SummaryPrompt,
    ) -> Result<GeneratedSummary, ProviderError>;

    /// Count the tokens an active message set occupies.
    async fn count_tokens(
        &self,
        model: &str,
        messages: &[Message],
    ) -> Result<TokenCount, ProviderError>;
}

fn summary_request(model: &str, prompt: &SummaryPrompt) -> ChatRequest {
    ChatRequest::new(
        model,
        vec![
            ChatMessage::system(prompt.system.clone()),
            ChatMessage::user(prompt.user.clone()),
        ],
    )
}

/// Hosted chat completion API.
///
/// Summaries are priced by the reported completion tokens; context size is
/// always estimated since the API has no cheap way to tokenize.
pub struct HostedBackend {
    chat: Arc<dyn ChatBackend>,
    estimator: TokenEstimator,
}

impl HostedBackend {
    pub fn new(chat: Arc<dyn ChatBackend>, estimator: TokenEstimator) -> Self {
        Self { chat, estimator }
    }
}

#[async_trait]
impl CompactionBackend for HostedBackend {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Hosted
    }

    async fn summarize(
        &self,
        model: &str,
        prompt: &SummaryPrompt,
    ) -> Result<GeneratedSummary, ProviderError> {
        let reply = self.chat.chat(summary_request(model, prompt)).await?;
        let token_count = reply
            .completion_tokens
            .unwrap_or_else(|| self.estimator.estimate(&reply.content));

        Ok(GeneratedSummary {
            text: reply.content,
            token_count,
        })
    }

    async fn count_tokens(
        &self,
        _model: &str,
        messages: &[Message],
    ) -> Result<TokenCount, ProviderError> {
        Ok(TokenCount::estimate(self.estimator.estimate_messages(messages)))
    }
}

/// Local model server.
///
/// Context size is measured with a one-token probe: the server tokenizes
/// the whole prompt and reports `prompt_eval_count`.
pub struct LocalBackend {
    chat: Arc<dyn ChatBackend>,
    probe_content: String,
}

impl LocalBackend {
    pub fn new(chat: Arc<dyn ChatBackend>, probe_content: impl Into<String>) -> Self {
        Self {
            chat,
            probe_content: probe_content.into(),
        }
    }
}

#[async_trait]
impl CompactionBackend for LocalBackend {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    async fn summarize(
        &self,
        model: &str,
        prompt: &SummaryPrompt,
    ) -> Result<GeneratedSummary, ProviderError> {
        let reply = self.chat.chat(summary_request(model, prompt)).await?;
        let token_count = reply
            .completion_tokens
            .unwrap_or_else(|| count_words(&reply.content));

        Ok(GeneratedSummary {
            text: reply.content,
            token_count,
        })
    }

    async fn count_tokens(
        &self,
        model: &str,
        messages: &[Message],
    ) -> Result<TokenCount, ProviderError> {
        let mut turns: Vec<ChatMessage> = messages.iter().map(ChatMessage::from).collect();
        turns.push(ChatMessage::user(self.probe_content.clone()));

        debug!(messages = messages.len(), "Probing local token count");
        let reply = self
            .chat
            .chat(ChatRequest::new(model, turns).with_max_tokens(1))
            .await?;

        reply.prompt_tokens.map(TokenCount::probe).ok_or_else(|| {
            ProviderError::malformed(self.chat.id(), "reply has no prompt_eval_count")
        })
    }
}

/// Stand-in for a provider with no registered backend.
///
/// Every call fails, which sends the engine down its fallback paths.
pub struct UnavailableBackend {
    kind: ProviderKind,
}

impl UnavailableBackend {
    pub fn new(kind: ProviderKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl CompactionBackend for UnavailableBackend {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn summarize(
        &self,
        _model: &str,
        _prompt: &SummaryPrompt,
    ) -> Result<GeneratedSummary, ProviderError> {
        Err(ProviderError::not_configured(self.kind.as_str()))
    }

    async fn count_tokens(
        &self,
        _model: &str,
        _messages: &[Message],
    ) -> Result<TokenCount, ProviderError> {
        Err(ProviderError::not_configured(self.kind.as_str()))
    }
}

/// Compaction backends keyed by provider kind.
#[derive(Default, Clone)]
pub struct BackendSet {
    backends: HashMap<ProviderKind, Arc<dyn CompactionBackend>>,
}

impl BackendSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a backend under its own kind.
    pub fn with(mut self, backend: Arc<dyn CompactionBackend>) -> Self {
        self.backends.insert(backend.kind(), backend);
        self
    }

    /// Wrap every chat backend in a registry.
    pub fn from_registry(registry: &ProviderRegistry, config: &CompactionConfig) -> Self {
        let estimator = TokenEstimator::new(config.chars_per_token);
        let mut set = Self::new();

        if let Some(chat) = registry.get(ProviderKind::Hosted) {
            set = set.with(Arc::new(HostedBackend::new(chat, estimator)));
        }
        if let Some(chat) = registry.get(ProviderKind::Local) {
            set = set.with(Arc::new(LocalBackend::new(chat, config.probe_content.clone())));
        }

        set
    }

    /// Backend for a provider kind. Missing kinds get an always-failing backend.
    pub fn get(&self, kind: ProviderKind) -> Arc<dyn CompactionBackend> {
        self.backends
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| Arc::new(UnavailableBackend::new(kind)))
    }

    pub fn contains(&self, kind: ProviderKind) -> bool {
        self.backends.contains_key(&kind)
    }
}
