//! # parley-providers
//!
//! Chat backends for Parley.
//!
//! This crate provides:
//! - The [`ChatBackend`] trait with typed requests and replies
//! - A hosted backend for OpenAI-style chat completion APIs
//! - A local backend for Ollama's native chat API
//! - A registry that builds backends from configuration

pub mod local;
pub mod openai;
pub mod registry;
pub mod traits;

pub use local::LocalProvider;
pub use openai::OpenAIProvider;
pub use registry::ProviderRegistry;
pub use traits::{ChatBackend, ChatMessage, ChatReply, ChatRequest};
