//! Error types for Parley.
//!
//! [`Error`] covers configuration, parsing and budget problems shared by all
//! crates. [`ProviderError`] describes a failed model call; the compaction
//! engine recovers from those, so they mostly surface in diagnostics.

use thiserror::Error;

/// Result type alias using the Parley error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Parley.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Provider(#[from] ProviderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Input that does not name a known role, provider or similar
    #[error("Invalid value: {0}")]
    Validation(String),

    /// Running token count is above the conversation's window
    #[error("Context window exceeded: {tokens} tokens, window is {window}")]
    ContextExceeded { tokens: u32, window: u32 },
}

impl Error {
    /// Get a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Error::Config(_) => Some("Check your config file at ~/.config/parley/config.toml"),
            Error::Provider(e) => e.recovery_suggestion(),
            Error::ContextExceeded { .. } => {
                Some("Run 'parley compress <id> --user <user>' to summarize older messages")
            }
            Error::Io(_) | Error::Validation(_) => None,
        }
    }
}

/// Failure of a single call to a chat backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Provider '{provider}' is not configured")]
    NotConfigured {
        provider: String,
        env_var: Option<String>,
    },

    /// Non-success HTTP status
    #[error("API request to {provider} failed: {status} - {message}")]
    ApiError {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("Request to {provider} timed out after {seconds}s")]
    Timeout { provider: String, seconds: u64 },

    #[error("Network error connecting to {provider}: {message}")]
    NetworkError { provider: String, message: String },

    /// Reply did not have the expected shape
    #[error("Malformed response from {provider}: {message}")]
    MalformedResponse { provider: String, message: String },
}

impl ProviderError {
    /// Create a not-configured error, naming the env var for known providers.
    pub fn not_configured(provider: &str) -> Self {
        ProviderError::NotConfigured {
            provider: provider.to_string(),
            env_var: match provider {
                "hosted" | "openai" => Some("OPENAI_API_KEY".to_string()),
                _ => None,
            },
        }
    }

    pub fn api_error(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        ProviderError::ApiError {
            provider: provider.into(),
            status,
            message: message.into(),
        }
    }

    pub fn malformed(provider: impl Into<String>, message: impl Into<String>) -> Self {
        ProviderError::MalformedResponse {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Get a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            ProviderError::NotConfigured {
                env_var: Some(_), ..
            } => Some("Set OPENAI_API_KEY or providers.hosted.api_key"),
            ProviderError::NotConfigured { .. } => {
                Some("Enable the provider under [providers] in config.toml")
            }
            ProviderError::ApiError { status: 401, .. } => {
                Some("Check that your API key is valid and not expired")
            }
            ProviderError::ApiError { status: 404, .. } => {
                Some("Check the model name; the backend does not know it")
            }
            ProviderError::ApiError { status: 429, .. } => {
                Some("You've hit a rate limit. Wait a moment and try again")
            }
            ProviderError::ApiError { status, .. } if *status >= 500 => {
                Some("The backend is having issues. Try again later")
            }
            ProviderError::Timeout { .. } => {
                Some("Raise providers.request_timeout_secs or check the backend load")
            }
            ProviderError::NetworkError { .. } => {
                Some("Check that the backend is reachable ('parley doctor')")
            }
            _ => None,
        }
    }
}

/// Format an error with its recovery suggestion.
pub fn format_error_with_suggestion(error: &Error) -> String {
    let mut output = error.to_string();
    if let Some(suggestion) = error.recovery_suggestion() {
        output.push_str(&format!("\n  Suggestion: {}", suggestion));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_configured_names_env_var() {
        let err = ProviderError::not_configured("hosted");
        assert_eq!(
            err,
            ProviderError::NotConfigured {
                provider: "hosted".to_string(),
                env_var: Some("OPENAI_API_KEY".to_string()),
            }
        );
        assert!(err.recovery_suggestion().unwrap().contains("OPENAI_API_KEY"));

        let local = ProviderError::not_configured("local");
        assert!(local.recovery_suggestion().unwrap().contains("[providers]"));
    }

    #[test]
    fn test_api_error_suggestions() {
        let err = ProviderError::api_error("hosted", 429, "Rate limited");
        assert!(err.to_string().contains("429"));
        assert!(err.recovery_suggestion().is_some());

        assert!(ProviderError::api_error("hosted", 503, "down")
            .recovery_suggestion()
            .is_some());
        assert!(ProviderError::api_error("hosted", 400, "bad")
            .recovery_suggestion()
            .is_none());
    }

    #[test]
    fn test_format_with_suggestion() {
        let err = Error::ContextExceeded {
            tokens: 9000,
            window: 8192,
        };
        let text = format_error_with_suggestion(&err);
        assert!(text.contains("9000 tokens, window is 8192"));
        assert!(text.contains("Suggestion:"));

        let plain = format_error_with_suggestion(&Error::Validation("role 'bot'".into()));
        assert!(!plain.contains("Suggestion:"));
    }
}
