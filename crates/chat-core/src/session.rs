//! Session Management
//!
//! In-memory bookkeeping of conversations by id, with exactly one current
//! session at all times.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::Conversation;

/// Model used for new sessions when nothing else is configured
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Unique session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// System prompt every new conversation starts with
pub fn system_prompt(now: DateTime<Local>) -> String {
    format!(
        "You are a chat AI assistant. When you use a tool, carefully read and incorporate \
         the 'Tool results' message in your response.\nCurrent date: {}",
        now.format("%Y-%m-%d %H:%M:%S")
    )
}

/// All live conversations plus the "current" pointer.
///
/// Sessions are kept in creation order. The store is never empty: it starts
/// with one session, and deleting the current one creates a replacement.
#[derive(Debug)]
pub struct SessionStore {
    sessions: Vec<Conversation>,
    current: usize,
    default_model: String,
    tools_enabled: bool,
}

impl SessionStore {
    /// Create a store holding one fresh, current session
    pub fn new(default_model: impl Into<String>, tools_enabled: bool) -> Self {
        let mut store = Self {
            sessions: Vec::new(),
            current: 0,
            default_model: default_model.into(),
            tools_enabled,
        };
        store.create();
        store
    }

    /// Start a new session and make it current
    pub fn create(&mut self) -> SessionId {
        let id = SessionId::new();
        let mut conversation = Conversation::new(
            id.clone(),
            self.default_model.clone(),
            system_prompt(Local::now()),
        );
        conversation.set_tools_enabled(self.tools_enabled);

        self.sessions.push(conversation);
        self.current = self.sessions.len() - 1;
        tracing::debug!(session = %id, "Created session");
        id
    }

    /// Make `id` current; false if it does not exist
    pub fn select(&mut self, id: &str) -> bool {
        match self.position(id) {
            Some(index) => {
                self.current = index;
                true
            }
            None => false,
        }
    }

    /// Remove a session; false if it does not exist.
    ///
    /// Deleting the current session creates and selects a replacement.
    pub fn delete(&mut self, id: &str) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };

        self.sessions.remove(index);
        tracing::debug!(session = %id, "Deleted session");

        if index == self.current {
            self.create();
        } else if index < self.current {
            self.current -= 1;
        }
        true
    }

    /// Switch the model of a session; false if it does not exist
    pub fn set_model(&mut self, id: &str, model: impl Into<String>) -> bool {
        match self.get_mut(id) {
            Some(conversation) => {
                conversation.set_model(model);
                true
            }
            None => false,
        }
    }

    /// Flip tool usage for a session and return the new state
    pub fn toggle_tools(&mut self, id: &str) -> Option<bool> {
        self.get_mut(id).map(Conversation::toggle_tools)
    }

    pub fn current_id(&self) -> &SessionId {
        self.current().id()
    }

    pub fn current(&self) -> &Conversation {
        &self.sessions[self.current]
    }

    pub fn current_mut(&mut self) -> &mut Conversation {
        &mut self.sessions[self.current]
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.sessions.iter().find(|c| c.id().as_str() == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Conversation> {
        self.sessions.iter_mut().find(|c| c.id().as_str() == id)
    }

    /// Sessions in creation order
    pub fn list(&self) -> impl Iterator<Item = &Conversation> {
        self.sessions.iter()
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|c| c.id().clone()).collect()
    }

    pub fn is_current(&self, id: &SessionId) -> bool {
        self.current_id() == id
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Always false; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.sessions.iter().position(|c| c.id().as_str() == id)
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL, true)
    }
}
