//! Error Types for the built-in tools

use chat_core::ChatError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ToolError>;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<ToolError> for ChatError {
    fn from(err: ToolError) -> Self {
        Self::ToolExecution(err.to_string())
    }
}
