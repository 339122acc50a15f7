//! LLM Provider Strategy Pattern
//!
//! Defines the streaming interface the turn loop consumes. Any backend that
//! can turn a model id, a message history and an optional tool list into an
//! ordered stream of chunks can drive a conversation.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use chat_core::provider::{LlmProvider, ModelRequest};
//!
//! let provider = OpenAiProvider::from_env()?;
//! let mut stream = provider.complete_stream(&request).await?;
//! while let Some(chunk) = stream.next().await { /* ... */ }
//! ```

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::Message;
use crate::tool::ToolSchema;

/// One streaming request to the model
#[derive(Clone, Debug)]
pub struct ModelRequest {
    /// Model identifier (e.g., "gpt-4o-mini")
    pub model: String,

    /// Full ordered history
    pub messages: Vec<Message>,

    /// Tools offered for this round; `None` means the request carries no tools
    pub tools: Option<Vec<ToolSchema>>,
}

impl ModelRequest {
    pub const fn offers_tools(&self) -> bool {
        self.tools.is_some()
    }
}

/// Reason a round ended
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// The model wants tool results before it continues
    ToolCalls,
    /// The model is done
    Stop,
    /// Anything else the API reports (length, content filter, ...)
    Other(String),
}

impl FinishReason {
    /// Map the API's raw finish reason string
    pub fn parse(raw: &str) -> Self {
        match raw {
            "tool_calls" => Self::ToolCalls,
            "stop" => Self::Stop,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ToolCalls => write!(f, "tool_calls"),
            Self::Stop => write!(f, "stop"),
            Self::Other(reason) => write!(f, "{reason}"),
        }
    }
}

/// A single increment from a streaming response
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamChunk {
    /// Assistant text delta
    Text(String),

    /// Fragment of one tool call, identified by its index within the round
    ToolCallDelta {
        index: u32,
        name: Option<String>,
        arguments: String,
    },

    /// Terminal signal for the round
    Finish(FinishReason),
}

/// Stream type for completion streaming
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// Information about a model
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub owned_by: Option<String>,
}

impl ModelInfo {
    /// Chat-completion capable ids, as opposed to legacy instruct models
    pub fn is_chat_model(&self) -> bool {
        self.id.starts_with("gpt") && !self.id.contains("instruct")
    }
}

/// Strategy trait for LLM providers
///
/// Implement this trait to add support for new LLM backends.
/// The turn loop works exclusively through this interface.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name, for logs
    fn name(&self) -> &str;

    /// Check if the provider is reachable and configured correctly
    async fn health_check(&self) -> Result<bool>;

    /// Open a streaming completion; the stream is lazy and not restartable
    async fn complete_stream(&self, request: &ModelRequest) -> Result<ChunkStream>;

    /// List available models
    async fn list_models(&self) -> Result<Vec<ModelInfo>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_reason_parsing() {
        assert_eq!(FinishReason::parse("tool_calls"), FinishReason::ToolCalls);
        assert_eq!(FinishReason::parse("stop"), FinishReason::Stop);
        assert_eq!(
            FinishReason::parse("length"),
            FinishReason::Other("length".into())
        );
        assert_eq!(FinishReason::Other("length".into()).to_string(), "length");
    }

    #[test]
    fn chat_model_filter() {
        let model = |id: &str| ModelInfo {
            id: id.into(),
            owned_by: None,
        };
        assert!(model("gpt-4o-mini").is_chat_model());
        assert!(!model("gpt-3.5-turbo-instruct").is_chat_model());
        assert!(!model("text-embedding-3-small").is_chat_model());
    }
}
