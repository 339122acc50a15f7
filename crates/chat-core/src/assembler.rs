//! Stream Assembler
//!
//! Turns the raw chunks of one model round into events the turn loop can act
//! on. Text is forwarded as it arrives; tool-call argument fragments are
//! buffered per call index until they parse as a complete JSON object.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::provider::{FinishReason, StreamChunk};
use crate::tool::ToolCall;

/// Something the turn loop must react to
#[derive(Clone, Debug, PartialEq)]
pub enum AssemblerEvent {
    /// A text fragment, forwarded unchanged
    TextAppended(String),

    /// A tool call whose arguments just became a complete object
    ToolCallReady { index: u32, call: ToolCall },

    /// The round is over
    RoundFinished(FinishReason),
}

/// Accumulator for one tool call index within a round
#[derive(Clone, Debug, Default)]
pub struct PendingToolCall {
    name: Option<String>,
    arguments: String,
    fired: bool,
}

impl PendingToolCall {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn arguments(&self) -> &str {
        &self.arguments
    }

    /// Whether this call already produced a `ToolCallReady` event
    pub const fn fired(&self) -> bool {
        self.fired
    }

    /// Fold one delta in and return the call if it is now complete.
    ///
    /// The first non-empty name wins. Only a JSON object counts as complete,
    /// so a scalar prefix such as `1` never fires. Once fired, later deltas
    /// for the same index are ignored.
    fn absorb(&mut self, name: Option<&str>, fragment: &str) -> Option<ToolCall> {
        if self.fired {
            return None;
        }

        if self.name.is_none() {
            if let Some(name) = name.filter(|n| !n.is_empty()) {
                self.name = Some(name.to_string());
            }
        }

        self.arguments.push_str(fragment);

        let name = self.name.as_ref()?;
        match serde_json::from_str::<Value>(&self.arguments) {
            Ok(Value::Object(arguments)) => {
                self.fired = true;
                Some(ToolCall::new(name.clone(), arguments))
            }
            _ => None,
        }
    }
}

/// Per-round chunk assembler
#[derive(Debug, Default)]
pub struct StreamAssembler {
    text: String,
    pending: BTreeMap<u32, PendingToolCall>,
    finished: Option<FinishReason>,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one chunk; each chunk yields at most one event.
    ///
    /// Chunks arriving after the finish chunk are dropped.
    pub fn push(&mut self, chunk: StreamChunk) -> Option<AssemblerEvent> {
        if self.finished.is_some() {
            tracing::debug!(?chunk, "Dropping chunk after round finished");
            return None;
        }

        match chunk {
            StreamChunk::Text(fragment) => {
                if fragment.is_empty() {
                    return None;
                }
                self.text.push_str(&fragment);
                Some(AssemblerEvent::TextAppended(fragment))
            }
            StreamChunk::ToolCallDelta {
                index,
                name,
                arguments,
            } => {
                let pending = self.pending.entry(index).or_default();
                pending
                    .absorb(name.as_deref(), &arguments)
                    .map(|call| AssemblerEvent::ToolCallReady { index, call })
            }
            StreamChunk::Finish(reason) => {
                for (index, call) in self.unresolved() {
                    tracing::debug!(
                        index,
                        name = call.name().unwrap_or("<unnamed>"),
                        arguments = %call.arguments(),
                        "Tool call never completed this round"
                    );
                }
                self.finished = Some(reason.clone());
                Some(AssemblerEvent::RoundFinished(reason))
            }
        }
    }

    /// Assistant text accumulated so far this round
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Take the accumulated text, leaving the buffer empty
    pub fn take_text(&mut self) -> String {
        std::mem::take(&mut self.text)
    }

    /// Tool calls that have not (yet) parsed into a complete object
    pub fn unresolved(&self) -> impl Iterator<Item = (u32, &PendingToolCall)> {
        self.pending
            .iter()
            .filter(|(_, call)| !call.fired)
            .map(|(index, call)| (*index, call))
    }

    pub const fn finish_reason(&self) -> Option<&FinishReason> {
        self.finished.as_ref()
    }
}
