//! Summary generation for compacted messages.
//!
//! The [`Summarizer`] asks the conversation's model for a short digest of
//! the messages being archived. Any backend failure is absorbed: a
//! deterministic summary is built from the messages themselves instead, so
//! compaction never fails because a model was unreachable.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use parley_core::{CompactionConfig, Message, ProviderError};

use crate::backend::CompactionBackend;
use crate::context::TokenEstimator;

const SYSTEM_PROMPT: &str = "You are a precise summarizer. Create concise summaries that \
                             capture the essential information from conversations: what was \
                             asked, what was answered and what was decided. Be factual and \
                             specific.";

/// Prompt sent to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryPrompt {
    pub system: String,
    pub user: String,
}

/// Where a summary came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SummarySource {
    /// Written by the model
    Generated,
    /// Built locally after the backend failed
    Fallback { reason: String },
}

impl SummarySource {
    pub fn is_fallback(&self) -> bool {
        matches!(self, SummarySource::Fallback { .. })
    }
}

/// Result of summarizing a block of messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryOutcome {
    pub text: String,
    pub token_count: u32,
    pub source: SummarySource,
}

/// Builds summarization prompts and fallback summaries.
#[derive(Debug, Clone)]
pub struct Summarizer {
    max_messages: usize,
    char_limit: usize,
    word_limit: usize,
    fallback_messages: usize,
    estimator: TokenEstimator,
}

impl Summarizer {
    pub fn new(config: &CompactionConfig) -> Self {
        Self {
            max_messages: config.max_summary_messages,
            char_limit: config.message_char_limit,
            word_limit: config.summary_word_limit,
            fallback_messages: config.fallback_message_count,
            estimator: TokenEstimator::new(config.chars_per_token),
        }
    }

    /// Build the prompt for a block of old messages.
    pub fn build_prompt(&self, old: &[Message]) -> SummaryPrompt {
        let mut lines = vec![format!(
            "Summarize the following conversation as short bullet points, \
             in under {} words.",
            self.word_limit
        )];
        lines.push(String::new());

        for message in old.iter().take(self.max_messages) {
            lines.push(format!(
                "{}: {}",
                message.role,
                truncate_chars(&message.content, self.char_limit)
            ));
        }

        let omitted = old.len().saturating_sub(self.max_messages);
        if omitted > 0 {
            lines.push(format!("({} later messages omitted)", omitted));
        }

        SummaryPrompt {
            system: SYSTEM_PROMPT.to_string(),
            user: lines.join("\n"),
        }
    }

    /// Deterministic summary used when the model cannot produce one.
    pub fn fallback_summary(&self, old: &[Message], reason: impl Into<String>) -> SummaryOutcome {
        let mut lines = vec![format!(
            "Summary of {} earlier messages (automatic summary unavailable):",
            old.len()
        )];

        for message in old.iter().take(self.fallback_messages) {
            lines.push(format!(
                "- {}: {}",
                message.role,
                truncate_chars(&message.content, self.char_limit)
            ));
        }

        // Never longer than the messages it stands in for.
        let archived_chars: usize = old.iter().map(|m| m.content.chars().count()).sum();
        let mut text = lines.join("\n");
        if text.chars().count() > archived_chars {
            text = text.chars().take(archived_chars.max(1)).collect();
        }
        let token_count = self.estimator.estimate(&text).max(1);

        SummaryOutcome {
            text,
            token_count,
            source: SummarySource::Fallback {
                reason: reason.into(),
            },
        }
    }

    /// Summarize `old` with the backend, falling back on any failure.
    pub async fn summarize(
        &self,
        backend: &dyn CompactionBackend,
        model: &str,
        old: &[Message],
    ) -> SummaryOutcome {
        let prompt = self.build_prompt(old);
        debug!(messages = old.len(), model, "Requesting summary");

        let generated = backend
            .summarize(model, &prompt)
            .await
            .and_then(|summary| {
                if summary.text.trim().is_empty() {
                    Err(ProviderError::malformed(
                        backend.kind().as_str(),
                        "empty summary",
                    ))
                } else {
                    Ok(summary)
                }
            });

        match generated {
            Ok(summary) => SummaryOutcome {
                text: summary.text.trim().to_string(),
                token_count: summary.token_count,
                source: SummarySource::Generated,
            },
            Err(e) => {
                warn!(error = %e, "Summary generation failed, using fallback summary");
                self.fallback_summary(old, e.to_string())
            }
        }
    }
}

/// Cut `text` to at most `limit` characters, marking the cut with `...`.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}
