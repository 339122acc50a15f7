//! # chat-runtime
//!
//! Runtime providers for chat-cli.
//!
//! ## Providers
//!
//! - **OpenAI**: any OpenAI-compatible `/chat/completions` endpoint with
//!   server-sent-event streaming and function-style tool calls
//!
//! ## Usage
//!
//! ```rust,ignore
//! use chat_runtime::{OpenAiConfig, OpenAiProvider};
//!
//! let provider = OpenAiProvider::from_config(OpenAiConfig::from_env()?)?;
//! let turn = TurnLoop::with_defaults(Arc::new(provider), Arc::new(registry));
//! ```

pub mod config;
pub mod openai;

pub use config::{ChatConfig, OpenAiConfig};
pub use openai::OpenAiProvider;

// Re-export core types for convenience
pub use chat_core::{ChatError, LlmProvider, Message, Result, Role, ToolRegistry};
