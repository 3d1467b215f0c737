//! Context compaction and restoration.
//!
//! The [`CompactionEngine`] replaces the older part of a conversation with a
//! single summary message, keeping every replaced message in the archive so
//! [`CompactionEngine::restore`] can put the conversation back exactly as it
//! was. Model calls happen before anything is written; all writes of one
//! operation go through a single store commit.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use parley_core::{CompactionConfig, Config, Conversation, Message};
use parley_providers::ProviderRegistry;

use crate::archive::Archiver;
use crate::backend::BackendSet;
use crate::classify::classify;
use crate::context::{TokenAccountant, TokenEstimator};
use crate::store::{CompactionCommit, ConversationStore, RestorationCommit, StoreError};
use crate::summarizer::{Summarizer, SummarySource};

/// Step of a compaction or restoration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Loading,
    Classifying,
    Summarizing,
    Archiving,
    Accounting,
    Committing,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Loading => "loading",
            Phase::Classifying => "classifying",
            Phase::Summarizing => "summarizing",
            Phase::Archiving => "archiving",
            Phase::Accounting => "accounting",
            Phase::Committing => "committing",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by the engine.
///
/// Backend failures never show up here; they are recovered by the
/// fallback summary and the estimated token count.
#[derive(Error, Debug)]
pub enum CompactionError {
    /// Missing, or owned by someone else
    #[error("Conversation not found: {0}")]
    NotFound(String),

    #[error("Storage error while {phase}: {source}")]
    Storage {
        phase: Phase,
        #[source]
        source: StoreError,
    },
}

impl CompactionError {
    /// HTTP status an outer layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            CompactionError::NotFound(_) => 404,
            CompactionError::Storage { .. } => 500,
        }
    }

    fn storage(phase: Phase) -> impl FnOnce(StoreError) -> Self {
        move |source| CompactionError::Storage { phase, source }
    }
}

pub type Result<T> = std::result::Result<T, CompactionError>;

/// Outcome of a compaction request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CompactionReport {
    Compacted(CompactionSummary),
    NotNeeded(NoCompaction),
}

impl CompactionReport {
    pub fn is_compacted(&self) -> bool {
        matches!(self, CompactionReport::Compacted(_))
    }
}

/// A compaction that was committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactionSummary {
    pub message: String,
    pub archived_messages: usize,
    pub summary_created: bool,
    pub summary_message_id: String,
    pub summary_source: SummarySource,
    pub previous_token_count: u32,
    pub new_token_count: u32,
    /// `new_token_count / context_window_size`
    pub token_percentage: f64,
    pub token_count_exact: bool,
}

/// A compaction request with nothing to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoCompaction {
    pub message: String,
    pub details: NoCompactionDetails,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoCompactionDetails {
    pub reason: String,
    pub non_system_messages: usize,
    pub keep_recent: usize,
}

/// Outcome of a restoration request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RestorationReport {
    Restored(RestorationSummary),
    NothingToRestore { message: String },
}

impl RestorationReport {
    pub fn is_restored(&self) -> bool {
        matches!(self, RestorationReport::Restored(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestorationSummary {
    pub message: String,
    pub restored_messages: usize,
    pub removed_summaries: usize,
    pub previous_token_count: u32,
    pub new_token_count: u32,
    pub token_count_exact: bool,
}

/// Outcome of a standalone recount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecountReport {
    pub conversation_id: String,
    pub previous_token_count: u32,
    pub new_token_count: u32,
    pub token_percentage: f64,
    pub token_count_exact: bool,
}

/// Per-conversation async locks.
///
/// Serializes compaction, restoration and recount of one conversation within
/// this process. Writers in other processes are caught by the store's
/// version check instead.
#[derive(Debug, Default)]
pub struct ConversationLocks {
    locks: parking_lot::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ConversationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a conversation.
    pub async fn acquire(&self, conversation_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            // Entries nobody holds or waits on
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(conversation_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Number of conversations currently locked or awaited.
    pub fn active(&self) -> usize {
        self.locks
            .lock()
            .values()
            .filter(|lock| Arc::strong_count(lock) > 1)
            .count()
    }
}

/// Orchestrates compaction, restoration and token recounts.
pub struct CompactionEngine {
    keep_recent: usize,
    summarizer: Summarizer,
    accountant: TokenAccountant,
    archiver: Archiver,
    backends: BackendSet,
    locks: ConversationLocks,
}

impl CompactionEngine {
    pub fn new(config: &CompactionConfig, backends: BackendSet) -> Self {
        Self {
            keep_recent: config.keep_recent,
            summarizer: Summarizer::new(config),
            accountant: TokenAccountant::new(TokenEstimator::new(config.chars_per_token)),
            archiver: Archiver::new(),
            backends,
            locks: ConversationLocks::new(),
        }
    }

    /// Build an engine over every backend the registry knows.
    pub fn from_config(config: &Config, registry: &ProviderRegistry) -> Self {
        let backends = BackendSet::from_registry(registry, &config.compaction);
        Self::new(&config.compaction, backends)
    }

    pub fn backends(&self) -> &BackendSet {
        &self.backends
    }

    /// Compact a conversation, keeping the last `keep_recent` non-system
    /// messages (the configured default when `None`).
    pub async fn compact<S: ConversationStore + ?Sized>(
        &self,
        store: &S,
        conversation_id: &str,
        user_id: &str,
        keep_recent: Option<usize>,
    ) -> Result<CompactionReport> {
        let _guard = self.locks.acquire(conversation_id).await;
        let conversation = load_owned(store, conversation_id, user_id).await?;
        let messages = store
            .active_messages(conversation_id)
            .await
            .map_err(CompactionError::storage(Phase::Loading))?;

        let keep_recent = keep_recent.unwrap_or(self.keep_recent);
        debug!(phase = %Phase::Classifying, conversation_id, keep_recent);
        let classified = classify(messages, keep_recent);

        if !classified.needs_compaction() {
            debug!(conversation_id, "No compaction needed");
            return Ok(not_needed(classified.non_system_count(), keep_recent));
        }

        let backend = self.backends.get(conversation.provider);

        debug!(phase = %Phase::Summarizing, conversation_id, old = classified.old.len());
        let outcome = self
            .summarizer
            .summarize(backend.as_ref(), &conversation.model, &classified.old)
            .await;

        debug!(phase = %Phase::Archiving, conversation_id);
        let Some(plan) =
            self.archiver
                .plan(conversation_id, &classified.old, &outcome, Utc::now())
        else {
            return Ok(not_needed(classified.non_system_count(), keep_recent));
        };

        debug!(phase = %Phase::Accounting, conversation_id);
        let active = classified.active_after(&plan.summary);
        let count = self
            .accountant
            .recount(backend.as_ref(), &conversation.model, &active)
            .await;

        if count.tokens > conversation.current_token_count {
            warn!(
                conversation_id,
                previous = conversation.current_token_count,
                new = count.tokens,
                "Summary is larger than what it replaces, leaving conversation as is"
            );
            return Ok(CompactionReport::NotNeeded(NoCompaction {
                message: "Compression would not reduce the token count".to_string(),
                details: NoCompactionDetails {
                    reason: format!(
                        "summary would raise the count from {} to {} tokens",
                        conversation.current_token_count, count.tokens
                    ),
                    non_system_messages: classified.non_system_count(),
                    keep_recent,
                },
            }));
        }

        debug!(phase = %Phase::Committing, conversation_id);
        let commit = CompactionCommit {
            conversation_id: conversation_id.to_string(),
            expected_version: conversation.version,
            summary: plan.summary,
            archives: plan.archives,
            new_token_count: count.tokens,
        };
        let archived = store
            .apply_compaction(&commit)
            .await
            .map_err(CompactionError::storage(Phase::Committing))?;

        info!(
            conversation_id,
            archived,
            fallback = outcome.source.is_fallback(),
            previous_tokens = conversation.current_token_count,
            new_tokens = count.tokens,
            "Conversation compacted"
        );

        Ok(CompactionReport::Compacted(CompactionSummary {
            message: format!("Compressed {} messages into a summary", archived),
            archived_messages: archived,
            summary_created: true,
            summary_message_id: commit.summary.id,
            summary_source: outcome.source,
            previous_token_count: conversation.current_token_count,
            new_token_count: count.tokens,
            token_percentage: conversation.usage_ratio(count.tokens),
            token_count_exact: count.method.is_exact(),
        }))
    }

    /// Put every archived message back and remove the summaries that replaced them.
    pub async fn restore<S: ConversationStore + ?Sized>(
        &self,
        store: &S,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<RestorationReport> {
        let _guard = self.locks.acquire(conversation_id).await;
        let conversation = load_owned(store, conversation_id, user_id).await?;
        let archives = store
            .archived_messages(conversation_id)
            .await
            .map_err(CompactionError::storage(Phase::Loading))?;

        if archives.is_empty() {
            return Ok(RestorationReport::NothingToRestore {
                message: "No archived messages found".to_string(),
            });
        }

        let active = store
            .active_messages(conversation_id)
            .await
            .map_err(CompactionError::storage(Phase::Loading))?;

        let mut summary_ids: Vec<String> = Vec::new();
        for archive in &archives {
            if !summary_ids.contains(&archive.summary_message_id) {
                summary_ids.push(archive.summary_message_id.clone());
            }
        }

        let restored: Vec<Message> = archives.iter().map(|a| a.to_message()).collect();
        let mut rebuilt: Vec<Message> = active
            .into_iter()
            .filter(|m| !summary_ids.contains(&m.id))
            .chain(restored.iter().cloned())
            .collect();
        rebuilt.sort_by(|a, b| (a.sequence, a.created_at).cmp(&(b.sequence, b.created_at)));

        debug!(phase = %Phase::Accounting, conversation_id);
        let backend = self.backends.get(conversation.provider);
        let count = self
            .accountant
            .recount(backend.as_ref(), &conversation.model, &rebuilt)
            .await;

        debug!(phase = %Phase::Committing, conversation_id);
        let commit = RestorationCommit {
            conversation_id: conversation_id.to_string(),
            expected_version: conversation.version,
            restored,
            archive_ids: archives.iter().map(|a| a.id.clone()).collect(),
            summary_ids,
            new_token_count: count.tokens,
        };
        let restored_count = store
            .apply_restoration(&commit)
            .await
            .map_err(CompactionError::storage(Phase::Committing))?;

        info!(
            conversation_id,
            restored = restored_count,
            summaries = commit.summary_ids.len(),
            new_tokens = count.tokens,
            "Conversation restored"
        );

        Ok(RestorationReport::Restored(RestorationSummary {
            message: format!("Restored {} archived messages", restored_count),
            restored_messages: restored_count,
            removed_summaries: commit.summary_ids.len(),
            previous_token_count: conversation.current_token_count,
            new_token_count: count.tokens,
            token_count_exact: count.method.is_exact(),
        }))
    }

    /// Recompute and store a conversation's token count without changing its messages.
    pub async fn recount<S: ConversationStore + ?Sized>(
        &self,
        store: &S,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<RecountReport> {
        let _guard = self.locks.acquire(conversation_id).await;
        let conversation = load_owned(store, conversation_id, user_id).await?;
        let active = store
            .active_messages(conversation_id)
            .await
            .map_err(CompactionError::storage(Phase::Loading))?;

        let backend = self.backends.get(conversation.provider);
        let count = self
            .accountant
            .recount(backend.as_ref(), &conversation.model, &active)
            .await;

        store
            .set_token_count(conversation_id, conversation.version, count.tokens)
            .await
            .map_err(CompactionError::storage(Phase::Committing))?;

        Ok(RecountReport {
            conversation_id: conversation_id.to_string(),
            previous_token_count: conversation.current_token_count,
            new_token_count: count.tokens,
            token_percentage: conversation.usage_ratio(count.tokens),
            token_count_exact: count.method.is_exact(),
        })
    }
}

fn not_needed(non_system_messages: usize, keep_recent: usize) -> CompactionReport {
    CompactionReport::NotNeeded(NoCompaction {
        message: "No compression needed".to_string(),
        details: NoCompactionDetails {
            reason: format!(
                "{} non-system messages, keeping the last {}",
                non_system_messages, keep_recent
            ),
            non_system_messages,
            keep_recent,
        },
    })
}

/// Load a conversation, hiding ones the caller does not own.
async fn load_owned<S: ConversationStore + ?Sized>(
    store: &S,
    conversation_id: &str,
    user_id: &str,
) -> Result<Conversation> {
    match store.get_conversation(conversation_id).await {
        Ok(conversation) if conversation.is_owned_by(user_id) => Ok(conversation),
        Ok(_) | Err(StoreError::NotFound(_)) => {
            Err(CompactionError::NotFound(conversation_id.to_string()))
        }
        Err(e) => Err(CompactionError::storage(Phase::Loading)(e)),
    }
}
