//! Shell commands
//!
//! Single-word commands typed at the prompt. Anything that is not a command
//! is sent to the model as a message.

use std::io::{self, Write};

use chat_core::{ModelInfo, SessionStore, ToolRegistry};

/// What the user typed
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Help,
    New,
    List,
    Select,
    Delete,
    ToggleTools,
    ListTools,
    Model,
    Quit,
    /// Blank or whitespace-only input
    Empty,
    Message(String),
}

impl Command {
    pub fn parse(input: &str) -> Self {
        match input.trim() {
            "?" => Self::Help,
            "n" => Self::New,
            "l" => Self::List,
            "s" => Self::Select,
            "d" => Self::Delete,
            "t" => Self::ToggleTools,
            "tl" => Self::ListTools,
            "m" => Self::Model,
            "q" => Self::Quit,
            "" => Self::Empty,
            _ => Self::Message(input.to_string()),
        }
    }
}

pub const HELP: &str = "\
Available commands:
? - Show this help
n - New conversation
l - List conversations
s - Select conversation
d - Delete conversation
t - Toggle tools
tl - List loaded tools
m - Change model
q - Quit";

pub fn help(out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "{HELP}")
}

pub fn new_session(store: &mut SessionStore, out: &mut impl Write) -> io::Result<()> {
    let id = store.create();
    writeln!(out, "Created new session: {id}")
}

/// Print every session id, marking the current one
pub fn list_sessions(store: &SessionStore, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "Available sessions:")?;
    for conversation in store.list() {
        let id = conversation.id();
        if store.is_current(id) {
            writeln!(out, "* {id} (current)")?;
        } else {
            writeln!(out, "  {id}")?;
        }
    }
    Ok(())
}

pub fn select_session(store: &mut SessionStore, id: &str, out: &mut impl Write) -> io::Result<()> {
    let id = id.trim();
    if id.is_empty() {
        return Ok(());
    }
    if store.select(id) {
        writeln!(out, "Switched to session: {id}")
    } else {
        writeln!(out, "Session not found: {id}")
    }
}

pub fn delete_session(store: &mut SessionStore, id: &str, out: &mut impl Write) -> io::Result<()> {
    let id = id.trim();
    if id.is_empty() {
        return Ok(());
    }
    if store.delete(id) {
        writeln!(out, "Deleted session: {id}")
    } else {
        writeln!(out, "Session not found: {id}")
    }
}

pub fn toggle_tools(store: &mut SessionStore, out: &mut impl Write) -> io::Result<()> {
    let id = store.current_id().clone();
    match store.toggle_tools(id.as_str()) {
        Some(true) => writeln!(out, "Tools are now enabled"),
        Some(false) => writeln!(out, "Tools are now disabled"),
        None => Ok(()),
    }
}

pub fn list_tools(tools: &ToolRegistry, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "Loaded tools:")?;
    for name in tools.names() {
        writeln!(out, "  {name}")?;
    }
    Ok(())
}

/// Print the chat-capable models, sorted
pub fn list_models(models: &[ModelInfo], out: &mut impl Write) -> io::Result<()> {
    let mut ids: Vec<_> = models
        .iter()
        .filter(|m| m.is_chat_model())
        .map(|m| m.id.as_str())
        .collect();
    ids.sort_unstable();

    writeln!(out, "Available models:")?;
    for id in ids {
        writeln!(out, "  {id}")?;
    }
    Ok(())
}

pub fn switch_model(store: &mut SessionStore, model: &str, out: &mut impl Write) -> io::Result<()> {
    let model = model.trim();
    if model.is_empty() {
        return Ok(());
    }
    let id = store.current_id().clone();
    if store.set_model(id.as_str(), model) {
        writeln!(out, "Switched to model: {model}")?;
    }
    Ok(())
}
