//! Configuration system for Parley.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Error;

/// Main configuration struct for Parley.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Compaction tunables
    pub compaction: CompactionConfig,
    /// Provider configurations
    pub providers: ProvidersConfig,
    /// Storage settings
    pub storage: StorageConfig,
}

/// Tunables for compaction, summarization and token estimation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    /// Non-system messages always kept verbatim
    pub keep_recent: usize,
    /// Old messages included in the summarization prompt
    pub max_summary_messages: usize,
    /// Character ceiling per message in prompts and fallback summaries
    pub message_char_limit: usize,
    /// Word ceiling requested from the summarizer
    pub summary_word_limit: usize,
    /// Old messages listed in a fallback summary
    pub fallback_message_count: usize,
    /// Average characters per token (for estimation)
    pub chars_per_token: f32,
    /// User turn appended to the active set for the local token probe
    pub probe_content: String,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            keep_recent: 2,
            max_summary_messages: 20,
            message_char_limit: 200,
            summary_word_limit: 150,
            fallback_message_count: 5,
            chars_per_token: 4.0,
            probe_content: ".".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Provider used for new conversations when none is given
    pub default_provider: String,
    /// Hosted (OpenAI-style) configuration
    pub hosted: Option<ProviderConfig>,
    /// Local/Ollama configuration
    pub local: Option<LocalProviderConfig>,
    /// Timeout applied to every backend request
    pub request_timeout_secs: u64,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            default_provider: "local".to_string(),
            hosted: None,
            local: None,
            request_timeout_secs: 60,
        }
    }
}

impl ProvidersConfig {
    /// Request timeout as a duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// API key (can be set directly or via environment)
    pub api_key: Option<String>,
    /// Environment variable name for API key
    pub api_key_env: Option<String>,
    /// Default model for this provider
    pub default_model: Option<String>,
    /// Base URL (optional, for custom endpoints)
    pub base_url: Option<String>,
}

impl ProviderConfig {
    /// Resolve the API key from either direct value or environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(ref key) = self.api_key {
            return Some(key.clone());
        }
        if let Some(ref env_var) = self.api_key_env {
            if let Ok(key) = std::env::var(env_var) {
                return Some(key);
            }
        }
        None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalProviderConfig {
    /// Enable local provider
    pub enabled: bool,
    /// Ollama URL
    pub base_url: Option<String>,
    /// Default model
    pub default_model: Option<String>,
}

impl Default for LocalProviderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: None,
            default_model: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Override for the data directory holding `conversations.db`
    pub data_dir: Option<PathBuf>,
}

/// Problems found by [`Config::validate`].
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// True when no issue is an error; warnings still load.
    pub fn is_ok(&self) -> bool {
        self.with_severity(IssueSeverity::Error).next().is_none()
    }

    pub fn with_severity(&self, severity: IssueSeverity) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(move |i| i.severity == severity)
    }

    fn push(&mut self, severity: IssueSeverity, field: &str, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity,
            field: field.to_string(),
            message: message.into(),
        });
    }

    fn require_positive(&mut self, field: &str, value: usize) {
        if value == 0 {
            self.push(IssueSeverity::Error, field, "must be greater than 0");
        }
    }

    fn require_http(&mut self, field: &str, url: Option<&str>) {
        if let Some(url) = url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                self.push(
                    IssueSeverity::Error,
                    field,
                    format!("'{}' is not an http:// or https:// URL", url),
                );
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub severity: IssueSeverity,
    /// Dotted key, e.g. `compaction.keep_recent`
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSeverity {
    Warning,
    Error,
}

impl Config {
    /// Build the layered figment: defaults, user config, project config, env.
    pub fn figment() -> Figment {
        let config_dir = Self::config_dir();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_dir.join("config.toml")))
            .merge(Toml::file(".parley/config.toml"))
            // Project local config (gitignored)
            .merge(Toml::file(".parley/config.local.toml"))
            // PARLEY_COMPACTION__KEEP_RECENT=4 -> compaction.keep_recent
            .merge(Env::prefixed("PARLEY_").split("__"))
    }

    /// Load configuration from all sources.
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    /// Load configuration, rejecting it on any validation error.
    pub fn load_validated() -> Result<Self, Error> {
        let config = Self::load().map_err(|e| Error::Config(e.to_string()))?;
        let result = config.validate();

        let errors: Vec<String> = result
            .with_severity(IssueSeverity::Error)
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        if !errors.is_empty() {
            return Err(Error::Config(format!(
                "invalid settings:\n  {}",
                errors.join("\n  ")
            )));
        }

        for warning in result.with_severity(IssueSeverity::Warning) {
            tracing::warn!(field = %warning.field, "{}", warning.message);
        }

        Ok(config)
    }

    /// Check compaction tunables and provider settings.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();
        let c = &self.compaction;

        if !(c.chars_per_token.is_finite() && c.chars_per_token > 0.0) {
            result.push(
                IssueSeverity::Error,
                "compaction.chars_per_token",
                "must be a positive number",
            );
        }
        if c.keep_recent == 0 {
            result.push(
                IssueSeverity::Warning,
                "compaction.keep_recent",
                "0 archives every non-system message on compaction",
            );
        }
        result.require_positive("compaction.max_summary_messages", c.max_summary_messages);
        result.require_positive("compaction.message_char_limit", c.message_char_limit);
        result.require_positive("compaction.summary_word_limit", c.summary_word_limit);
        result.require_positive("compaction.fallback_message_count", c.fallback_message_count);
        if c.probe_content.is_empty() {
            result.push(IssueSeverity::Error, "compaction.probe_content", "cannot be empty");
        }

        let providers = &self.providers;
        if providers.default_provider.parse::<crate::ProviderKind>().is_err() {
            result.push(
                IssueSeverity::Error,
                "providers.default_provider",
                format!("unknown provider '{}', expected local or hosted", providers.default_provider),
            );
        }
        if providers.request_timeout_secs == 0 {
            result.push(
                IssueSeverity::Error,
                "providers.request_timeout_secs",
                "must be greater than 0",
            );
        }
        if let Some(hosted) = &providers.hosted {
            if hosted.api_key.as_deref() == Some("") {
                result.push(IssueSeverity::Warning, "providers.hosted.api_key", "is an empty string");
            }
            result.require_http("providers.hosted.base_url", hosted.base_url.as_deref());
        }
        if let Some(local) = &providers.local {
            result.require_http("providers.local.base_url", local.base_url.as_deref());
        }

        result
    }

    /// Get the configuration directory.
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|p| p.join("parley"))
            .unwrap_or_else(|| PathBuf::from("~/.config/parley"))
    }

    /// Get the data directory (for the conversation database).
    pub fn data_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.storage.data_dir {
            return dir.clone();
        }
        dirs::data_local_dir()
            .map(|p| p.join("parley"))
            .unwrap_or_else(|| PathBuf::from("~/.local/share/parley"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        let result = config.validate();
        assert!(result.is_ok(), "Default config should be valid: {:?}", result.issues);
        assert_eq!(config.compaction.keep_recent, 2);
        assert_eq!(config.compaction.max_summary_messages, 20);
        assert_eq!(config.compaction.message_char_limit, 200);
    }

    #[test]
    fn test_invalid_chars_per_token() {
        let mut config = Config::default();
        config.compaction.chars_per_token = 0.0;
        let result = config.validate();
        assert!(!result.is_ok());
        assert!(result
            .with_severity(IssueSeverity::Error)
            .any(|e| e.field == "compaction.chars_per_token"));
    }

    #[test]
    fn test_zero_keep_recent_is_warning() {
        let mut config = Config::default();
        config.compaction.keep_recent = 0;
        let result = config.validate();
        assert!(result.is_ok());
        assert!(result
            .with_severity(IssueSeverity::Warning)
            .any(|e| e.field == "compaction.keep_recent"));
    }

    #[test]
    fn test_invalid_default_provider() {
        let mut config = Config::default();
        config.providers.default_provider = "anthropic".to_string();
        let result = config.validate();
        assert!(!result.is_ok());
    }

    #[test]
    fn test_invalid_hosted_base_url() {
        let mut config = Config::default();
        config.providers.hosted = Some(ProviderConfig {
            base_url: Some("api.example.com".to_string()),
            ..Default::default()
        });
        let result = config.validate();
        assert!(result
            .with_severity(IssueSeverity::Error)
            .any(|e| e.field == "providers.hosted.base_url"));
    }

    #[test]
    fn test_layered_load() {
        figment::Jail::expect_with(|jail| {
            jail.create_dir(".parley")?;
            jail.create_file(
                ".parley/config.toml",
                r#"
                [compaction]
                keep_recent = 4
                chars_per_token = 3.5

                [providers.local]
                base_url = "http://10.0.0.2:11434"
                "#,
            )?;
            jail.set_env("PARLEY_COMPACTION__MAX_SUMMARY_MESSAGES", "8");

            let config = Config::load()?;
            assert_eq!(config.compaction.keep_recent, 4);
            assert_eq!(config.compaction.chars_per_token, 3.5);
            assert_eq!(config.compaction.max_summary_messages, 8);
            assert_eq!(config.compaction.message_char_limit, 200);
            assert_eq!(
                config.providers.local.and_then(|l| l.base_url).as_deref(),
                Some("http://10.0.0.2:11434")
            );
            Ok(())
        });
    }

    #[test]
    fn test_data_dir_override() {
        let mut config = Config::default();
        config.storage.data_dir = Some(PathBuf::from("/srv/parley"));
        assert_eq!(config.data_dir(), PathBuf::from("/srv/parley"));
    }
}
