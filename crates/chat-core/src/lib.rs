//! # chat-core
//!
//! Provider-agnostic streaming chat with tool calling.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          TurnLoop                            │
//! │  ┌──────────────┐  ┌───────────────┐  ┌──────────────────┐   │
//! │  │    Stream    │  │     Tool      │  │   LlmProvider    │   │
//! │  │  Assembler   │──│   Registry    │──│   (Strategy)     │   │
//! │  └──────────────┘  └───────────────┘  └──────────────────┘   │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │ &mut Conversation
//!                        ┌───────┴────────┐
//!                        │  SessionStore  │
//!                        └────────────────┘
//! ```
//!
//! The `LlmProvider` trait keeps the turn loop independent of the HTTP
//! backend, and the `Tool` trait keeps it independent of what tools do.

pub mod assembler;
pub mod error;
pub mod message;
pub mod provider;
pub mod session;
pub mod tool;
pub mod turn;

pub use assembler::{AssemblerEvent, StreamAssembler};
pub use error::{ChatError, Result};
pub use message::{Conversation, Message, Role};
pub use provider::{ChunkStream, FinishReason, LlmProvider, ModelInfo, ModelRequest, StreamChunk};
pub use session::{DEFAULT_MODEL, SessionId, SessionStore, system_prompt};
pub use tool::{
    ParameterSchema, Tool, ToolCall, ToolFactory, ToolLoadError, ToolRegistry, ToolResult,
    ToolSchema, run_tool,
};
pub use turn::{TurnConfig, TurnLoop, TurnOutcome, TurnSink, TurnState};
