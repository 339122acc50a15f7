//! Runtime configuration
//!
//! Everything comes from the environment (a `.env` file is loaded by the
//! binary before these run). Command-line flags override afterwards.

use std::time::Duration;

use chat_core::{ChatError, DEFAULT_MODEL, Result, TurnConfig};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MAX_ROUNDS: usize = 25;

/// OpenAI-compatible endpoint configuration
#[derive(Clone)]
pub struct OpenAiConfig {
    /// Bearer token; may be empty for local endpoints that need none
    pub api_key: String,

    /// Base URL without trailing slash
    pub base_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" })
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl OpenAiConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup.
    ///
    /// `OPENAI_API_KEY` is required unless `OPENAI_BASE_URL` points somewhere
    /// other than the hosted API.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let base_url = lookup("OPENAI_BASE_URL")
            .filter(|v| !v.trim().is_empty())
            .map_or_else(|| DEFAULT_BASE_URL.to_string(), |v| v.trim_end_matches('/').to_string());

        let api_key = lookup("OPENAI_API_KEY").unwrap_or_default();
        if api_key.is_empty() && base_url == DEFAULT_BASE_URL {
            return Err(ChatError::Config("OPENAI_API_KEY is not set".into()));
        }

        let timeout_secs = parse_or(&lookup, "CHAT_REQUEST_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;

        Ok(Self {
            api_key,
            base_url,
            timeout_secs,
        })
    }

    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Conversation defaults
#[derive(Clone, Debug)]
pub struct ChatConfig {
    /// Model for new sessions
    pub model: String,

    /// Whether new sessions start with tools on
    pub tools_enabled: bool,

    /// Model rounds allowed per turn
    pub max_rounds: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.into(),
            tools_enabled: true,
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }
}

impl ChatConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let model = lookup("CHAT_MODEL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.into());
        let max_rounds = parse_or(&lookup, "CHAT_MAX_ROUNDS", DEFAULT_MAX_ROUNDS)?;
        if max_rounds == 0 {
            return Err(ChatError::Config("CHAT_MAX_ROUNDS must be at least 1".into()));
        }

        Ok(Self {
            model,
            max_rounds,
            ..Default::default()
        })
    }

    pub const fn turn_config(&self) -> TurnConfig {
        TurnConfig {
            max_rounds: self.max_rounds,
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| ChatError::Config(format!("{key} has invalid value '{raw}'"))),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let config = OpenAiConfig::from_lookup(env(&[("OPENAI_API_KEY", "sk-test")])).unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout(), Duration::from_secs(120));

        let chat = ChatConfig::from_lookup(env(&[])).unwrap();
        assert_eq!(chat.model, "gpt-4o-mini");
        assert_eq!(chat.max_rounds, 25);
    }

    #[test]
    fn hosted_api_requires_key() {
        let err = OpenAiConfig::from_lookup(env(&[])).unwrap_err();
        assert!(matches!(err, ChatError::Config(_)));
    }

    #[test]
    fn local_endpoint_needs_no_key() {
        let config =
            OpenAiConfig::from_lookup(env(&[("OPENAI_BASE_URL", "http://localhost:11434/v1/")]))
                .unwrap();
        assert_eq!(config.base_url, "http://localhost:11434/v1");
        assert!(config.api_key.is_empty());
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let err = ChatConfig::from_lookup(env(&[("CHAT_MAX_ROUNDS", "lots")])).unwrap_err();
        assert!(err.to_string().contains("CHAT_MAX_ROUNDS"));
        assert!(ChatConfig::from_lookup(env(&[("CHAT_MAX_ROUNDS", "0")])).is_err());
    }

    #[test]
    fn debug_hides_api_key() {
        let config = OpenAiConfig {
            api_key: "sk-secret".into(),
            ..Default::default()
        };
        assert!(!format!("{config:?}").contains("sk-secret"));
    }
}
