//! # parley-core
//!
//! Core types and abstractions for Parley - conversation storage with
//! context-window compaction.
//!
//! This crate provides:
//! - Conversation, message and archive primitives
//! - Provider kinds (local vs hosted inference)
//! - Layered configuration system
//! - Common error types

pub mod config;
pub mod conversation;
pub mod error;
pub mod message;

pub use config::{CompactionConfig, Config};
pub use conversation::{Conversation, ProviderKind};
pub use error::{Error, ProviderError, Result};
pub use message::{Message, MessageArchive, Role};
