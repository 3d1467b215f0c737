//! Conversation types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which inference backend serves a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Local inference (Ollama-style API)
    Local,
    /// Hosted inference (OpenAI-style API)
    Hosted,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Local => "local",
            ProviderKind::Hosted => "hosted",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" | "ollama" => Ok(ProviderKind::Local),
            "hosted" | "openai" => Ok(ProviderKind::Hosted),
            other => Err(crate::Error::Validation(format!(
                "Unknown provider '{}'. Valid providers: local, hosted",
                other
            ))),
        }
    }
}

/// A chat conversation and its token budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID
    pub id: String,
    /// Owning user
    pub user_id: String,
    /// Optional display title
    pub title: Option<String>,
    /// Model name used for summarization and probing
    pub model: String,
    /// Backend serving the model
    pub provider: ProviderKind,
    /// Token ceiling of the model's context window
    pub context_window_size: u32,
    /// Authoritative token count of the active messages
    pub current_token_count: u32,
    /// Optimistic concurrency token, bumped by every structural commit
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new, empty conversation.
    pub fn new(
        user_id: impl Into<String>,
        model: impl Into<String>,
        provider: ProviderKind,
        context_window_size: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            title: None,
            model: model.into(),
            provider,
            context_window_size,
            current_token_count: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Check if the given user owns this conversation.
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }

    /// Share of the context window a token count occupies.
    pub fn usage_ratio(&self, tokens: u32) -> f64 {
        if self.context_window_size == 0 {
            return 0.0;
        }
        tokens as f64 / self.context_window_size as f64
    }

    /// Fail when the running token count no longer fits the context window.
    pub fn check_budget(&self) -> crate::Result<()> {
        if self.current_token_count > self.context_window_size {
            return Err(crate::Error::ContextExceeded {
                tokens: self.current_token_count,
                window: self.context_window_size,
            });
        }
        Ok(())
    }
}
