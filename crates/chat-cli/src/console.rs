//! Terminal output for a running turn

use std::io::Write;

use chat_core::{ToolCall, ToolResult, TurnSink};

/// Streams model text and tool activity to a writer (stdout in the binary)
pub struct ConsoleSink<W: Write> {
    out: W,
    at_line_start: bool,
}

impl<W: Write> ConsoleSink<W> {
    pub const fn new(out: W) -> Self {
        Self {
            out,
            at_line_start: true,
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) {
        if !self.at_line_start {
            let _ = writeln!(self.out);
        }
        let _ = writeln!(self.out, "{text}");
        let _ = self.out.flush();
        self.at_line_start = true;
    }
}

impl<W: Write> TurnSink for ConsoleSink<W> {
    fn text(&mut self, fragment: &str) {
        let _ = write!(self.out, "{fragment}");
        let _ = self.out.flush();
        self.at_line_start = fragment.ends_with('\n');
    }

    fn warning(&mut self, message: &str) {
        self.line(message);
    }

    fn tool_started(&mut self, call: &ToolCall) {
        let arguments = serde_json::Value::Object(call.arguments.clone());
        self.line(&format!("Running tool: {}\n {arguments}", call.name));
    }

    fn tool_finished(&mut self, result: &ToolResult) {
        if let Some(error) = &result.error {
            self.line(&format!("Tool {} failed: {error}", result.name));
        }
    }
}
