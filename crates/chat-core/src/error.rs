//! Error Types

use thiserror::Error;

/// Result type alias for chat operations
pub type Result<T> = std::result::Result<T, ChatError>;

/// Chat error types
#[derive(Error, Debug)]
pub enum ChatError {
    /// Model provider error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider unavailable or not responding
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The response stream broke off mid-round
    #[error("Stream error: {0}")]
    Stream(String),

    /// Tool not found in registry
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Tool failed to initialize
    #[error("Tool '{name}' failed to load: {reason}")]
    ToolLoad { name: String, reason: String },

    /// Tool validation failed
    #[error("Tool validation error: {0}")]
    ToolValidation(String),

    /// Tool execution failed
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// User message was empty or whitespace only
    #[error("Empty input is not allowed")]
    EmptyMessage,

    /// Maximum model rounds reached within one turn
    #[error("Maximum rounds ({0}) reached")]
    MaxRounds(usize),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rate limited
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ChatError {
    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Provider(msg) => format!("The model API returned an error: {msg}"),
            Self::ProviderUnavailable(_) => {
                "The model API is currently unavailable. Please try again.".into()
            }
            Self::Stream(msg) => format!("The response stream was interrupted: {msg}"),
            Self::ToolNotFound(name) => format!("The tool '{name}' is not available."),
            Self::ToolLoad { name, .. } => format!("The tool '{name}' could not be loaded."),
            Self::ToolValidation(msg) => format!("Invalid tool input: {msg}"),
            Self::ToolExecution(msg) => format!("Tool error: {msg}"),
            Self::MaxRounds(n) => {
                format!("The model kept calling tools for {n} rounds; the turn was stopped.")
            }
            Self::EmptyMessage => "Empty input is not allowed.".into(),
            Self::RateLimited(_) => "Too many requests. Please wait a moment.".into(),
            Self::Auth(_) => "Authentication failed. Check OPENAI_API_KEY.".into(),
            Self::Config(msg) => format!("Configuration problem: {msg}"),
            Self::Json(msg) => format!("Malformed data: {msg}"),
        }
    }
}
