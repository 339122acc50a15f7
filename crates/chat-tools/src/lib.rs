//! # chat-tools
//!
//! Built-in tools the model can call mid-stream.
//!
//! | Tool           | Does                                              |
//! |----------------|---------------------------------------------------|
//! | `Search`       | First DuckDuckGo instant-answer hit for a query   |
//! | `Requests`     | Arbitrary HTTP request, raw or summarised         |
//! | `ShellCommand` | `sh -c` a command the user has confirmed          |
//!
//! Tools report their own failures as `{"error": ...}` payloads so the model
//! can read and react to them.

pub mod catalog;
pub mod error;
pub mod request;
pub mod search;
pub mod shell;

pub use catalog::{ToolsConfig, builtin_catalog};
pub use error::{Result, ToolError};
pub use request::RequestsTool;
pub use search::SearchTool;
pub use shell::ShellCommandTool;
