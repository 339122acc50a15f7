//! Conversation Messages
//!
//! Standard message format used across the chat system.

use serde::{Deserialize, Serialize};

use crate::session::SessionId;

/// Role of a message sender
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt/instructions
    System,
    /// User input
    User,
    /// Assistant (LLM) response
    Assistant,
    /// Tool result (injected as context)
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// A single message in a conversation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Create a new message
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self::new(Role::Tool, content)
    }
}

/// One session's conversation: append-only history plus per-session settings.
///
/// The history always starts with exactly one system message; messages are
/// never edited or removed once pushed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Conversation {
    id: SessionId,
    messages: Vec<Message>,
    model: String,
    tools_enabled: bool,
    tool_failures: u32,
}

impl Conversation {
    pub fn new(id: SessionId, model: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            id,
            messages: vec![Message::system(system_prompt)],
            model: model.into(),
            tools_enabled: true,
            tool_failures: 0,
        }
    }

    pub const fn id(&self) -> &SessionId {
        &self.id
    }

    /// Add a message
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Get all messages
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Get the last message
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Content of the most recent assistant message, if any
    pub fn last_assistant(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    pub const fn tools_enabled(&self) -> bool {
        self.tools_enabled
    }

    /// Flip the tools-enabled flag and return the new state
    pub const fn toggle_tools(&mut self) -> bool {
        self.tools_enabled = !self.tools_enabled;
        self.tools_enabled
    }

    pub const fn set_tools_enabled(&mut self, enabled: bool) {
        self.tools_enabled = enabled;
    }

    /// Consecutive failed or unresolved tool attempts
    pub const fn tool_failures(&self) -> u32 {
        self.tool_failures
    }

    pub const fn record_tool_failure(&mut self) {
        self.tool_failures = self.tool_failures.saturating_add(1);
    }

    pub const fn record_tool_success(&mut self) {
        self.tool_failures = 0;
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Always false: the system message is present from construction
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello");
    }

    #[test]
    fn message_serializes_role_lowercase() {
        let json = serde_json::to_value(Message::assistant("Hello")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "assistant", "content": "Hello"}));
    }

    #[test]
    fn test_conversation() {
        let mut conv = Conversation::new(SessionId::new(), "gpt-4o-mini", "You are helpful.");
        conv.push(Message::user("Hi"));
        conv.push(Message::assistant("Hello!"));

        assert_eq!(conv.len(), 3);
        assert_eq!(conv.messages()[0].role, Role::System);
        assert_eq!(conv.last().unwrap().role, Role::Assistant);
        assert_eq!(conv.last_assistant(), Some("Hello!"));
    }

    #[test]
    fn failure_counter_resets_on_success() {
        let mut conv = Conversation::new(SessionId::new(), "m", "sys");
        conv.record_tool_failure();
        conv.record_tool_failure();
        assert_eq!(conv.tool_failures(), 2);
        conv.record_tool_success();
        assert_eq!(conv.tool_failures(), 0);
    }

    #[test]
    fn toggle_tools_flips_state() {
        let mut conv = Conversation::new(SessionId::new(), "m", "sys");
        assert!(conv.tools_enabled());
        assert!(!conv.toggle_tools());
        assert!(conv.toggle_tools());
    }
}
