//! Provider registry for managing available backends.

use std::collections::HashMap;
use std::sync::Arc;

use parley_core::{Config, ProviderKind};

use super::local::LocalProvider;
use super::openai::OpenAIProvider;
use super::traits::ChatBackend;

/// Registry of configured chat backends, keyed by provider kind.
pub struct ProviderRegistry {
    backends: HashMap<ProviderKind, Arc<dyn ChatBackend>>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
        }
    }

    /// Initialize registry from configuration.
    ///
    /// The hosted backend is registered when an API key is found in the
    /// config or in `OPENAI_API_KEY`. The local backend is registered unless
    /// explicitly disabled.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();
        let timeout = config.providers.request_timeout();

        let hosted_config = config.providers.hosted.as_ref();
        let hosted_key = hosted_config
            .and_then(|c| c.resolve_api_key())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok());

        if let Some(api_key) = hosted_key {
            let mut provider = OpenAIProvider::new(api_key).with_timeout(timeout);
            if let Some(base_url) = hosted_config.and_then(|c| c.base_url.as_ref()) {
                provider = provider.with_base_url(base_url);
            } else if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
                provider = provider.with_base_url(base_url);
            }
            if let Some(model) = hosted_config.and_then(|c| c.default_model.as_ref()) {
                provider = provider.with_default_model(model);
            }
            registry.register(ProviderKind::Hosted, Arc::new(provider));
        }

        let local_config = config.providers.local.as_ref();
        let local_enabled = local_config.map(|c| c.enabled).unwrap_or(true);

        if local_enabled {
            let mut provider = local_config
                .and_then(|c| c.base_url.as_ref())
                .map(LocalProvider::with_url)
                .or_else(|| std::env::var("OLLAMA_HOST").ok().map(LocalProvider::with_url))
                .unwrap_or_default()
                .with_timeout(timeout);
            if let Some(model) = local_config.and_then(|c| c.default_model.as_ref()) {
                provider = provider.with_default_model(model);
            }
            registry.register(ProviderKind::Local, Arc::new(provider));
        }

        registry
    }

    /// Register a backend, replacing any previous one for the same kind.
    pub fn register(&mut self, kind: ProviderKind, backend: Arc<dyn ChatBackend>) {
        self.backends.insert(kind, backend);
    }

    /// Get the backend for a provider kind.
    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn ChatBackend>> {
        self.backends.get(&kind).cloned()
    }

    /// List registered provider kinds.
    pub fn list(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<ProviderKind> = self.backends.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
