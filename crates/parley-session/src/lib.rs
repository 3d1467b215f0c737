//! # parley-session
//!
//! Conversation persistence and context compaction for Parley.
//!
//! This crate provides:
//! - SQLite-backed storage for conversations, messages and archives
//! - Token estimation and backend-assisted token accounting
//! - Compaction: older messages are archived and replaced by one summary
//! - Restoration of archived messages
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use parley_core::Config;
//! use parley_providers::ProviderRegistry;
//! use parley_session::{CompactionEngine, SqliteConversationStore};
//!
//! let config = Config::load()?;
//! let store = SqliteConversationStore::open(&config)?;
//! let registry = ProviderRegistry::from_config(&config);
//! let engine = CompactionEngine::from_config(&config, &registry);
//!
//! let report = engine.compact(&store, &conversation_id, &user_id, None).await?;
//! ```
//!
//! ## Compaction
//!
//! System messages are never archived. The last `keep_recent` non-system
//! messages stay verbatim; everything older is summarized by the
//! conversation's own model. When the model cannot answer, a deterministic
//! summary is built from the messages instead. Archived messages, the
//! summary and the new token count are written in one transaction.

pub mod archive;
pub mod backend;
pub mod classify;
pub mod compaction;
pub mod context;
pub mod store;
pub mod summarizer;

// Re-export commonly used types
pub use archive::{ArchivePlan, Archiver};
pub use backend::{
    BackendSet, CompactionBackend, GeneratedSummary, HostedBackend, LocalBackend,
    UnavailableBackend,
};
pub use classify::{classify, ClassifiedMessages};
pub use compaction::{
    CompactionEngine, CompactionError, CompactionReport, CompactionSummary, ConversationLocks,
    NoCompaction, NoCompactionDetails, Phase, RecountReport, RestorationReport,
    RestorationSummary,
};
pub use context::{count_words, CountMethod, TokenAccountant, TokenCount, TokenEstimator};
pub use store::{
    CompactionCommit, ConversationStore, ConversationSummary, RestorationCommit,
    SqliteConversationStore, StoreError,
};
pub use summarizer::{truncate_chars, Summarizer, SummaryOutcome, SummaryPrompt, SummarySource};
