//! Token accounting for conversation context.
//!
//! The estimator turns text into an approximate token count. The accountant
//! derives the authoritative count for an active message set, asking the
//! conversation's backend first and estimating when it cannot answer.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use parley_core::Message;

use crate::backend::CompactionBackend;

/// Character-ratio token estimator.
#[derive(Debug, Clone, Copy)]
pub struct TokenEstimator {
    chars_per_token: f32,
}

impl TokenEstimator {
    /// Create an estimator. Non-positive ratios fall back to 4 characters per token.
    pub fn new(chars_per_token: f32) -> Self {
        let chars_per_token = if chars_per_token > 0.0 {
            chars_per_token
        } else {
            4.0
        };
        Self { chars_per_token }
    }

    pub fn chars_per_token(&self) -> f32 {
        self.chars_per_token
    }

    /// Estimate tokens in a piece of text, truncated toward zero.
    pub fn estimate(&self, text: &str) -> u32 {
        self.tokens_for_chars(text.chars().count())
    }

    /// Estimate tokens in the concatenated content of a message set.
    pub fn estimate_messages(&self, messages: &[Message]) -> u32 {
        let chars: usize = messages.iter().map(|m| m.content.chars().count()).sum();
        self.tokens_for_chars(chars)
    }

    fn tokens_for_chars(&self, chars: usize) -> u32 {
        (chars as f64 / f64::from(self.chars_per_token)) as u32
    }
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::new(4.0)
    }
}

/// Whitespace-separated word count, used when a local reply omits `eval_count`.
pub fn count_words(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}

/// How a token count was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountMethod {
    /// Reported by the model's tokenizer
    Probe,
    /// Derived from the character ratio
    Estimate,
}

impl CountMethod {
    pub fn is_exact(&self) -> bool {
        matches!(self, CountMethod::Probe)
    }
}

/// A token count with its provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCount {
    pub tokens: u32,
    pub method: CountMethod,
}

impl TokenCount {
    pub fn probe(tokens: u32) -> Self {
        Self {
            tokens,
            method: CountMethod::Probe,
        }
    }

    pub fn estimate(tokens: u32) -> Self {
        Self {
            tokens,
            method: CountMethod::Estimate,
        }
    }
}

/// Recomputes a conversation's token count after structural changes.
///
/// Never sums stored per-message counts: those go stale as soon as the
/// message set changes shape.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenAccountant {
    estimator: TokenEstimator,
}

impl TokenAccountant {
    pub fn new(estimator: TokenEstimator) -> Self {
        Self { estimator }
    }

    pub fn estimator(&self) -> &TokenEstimator {
        &self.estimator
    }

    /// Count the tokens of an active message set.
    pub async fn recount(
        &self,
        backend: &dyn CompactionBackend,
        model: &str,
        active: &[Message],
    ) -> TokenCount {
        match backend.count_tokens(model, active).await {
            Ok(count) => {
                debug!(tokens = count.tokens, method = ?count.method, "Recounted context");
                count
            }
            Err(e) => {
                warn!(error = %e, "Token probe failed, using estimate");
                TokenCount::estimate(self.estimator.estimate_messages(active))
            }
        }
    }
}
