//! Interactive shell
//!
//! Reads input from stdin, dispatches commands and runs chat turns. Ctrl-C
//! during a turn abandons that turn; Ctrl-C or end of input at the prompt
//! leaves the shell.

use std::io::{self, Write};
use std::sync::Arc;

use chat_core::{ChatError, LlmProvider, SessionStore, ToolRegistry, TurnConfig, TurnLoop};
use tokio::sync::mpsc;

use crate::commands::{self, Command};
use crate::console::ConsoleSink;

pub const PROMPT: &str = "You (help: ?)> ";

const INPUT_BUFFER: usize = 16;

/// Line reader with `\` continuation
pub struct InputReader {
    lines: mpsc::Receiver<io::Result<String>>,
}

impl InputReader {
    /// Read stdin on a detached thread so a pending read never holds up
    /// cancellation or process exit.
    pub fn stdin() -> Self {
        let (tx, rx) = mpsc::channel(INPUT_BUFFER);
        std::thread::spawn(move || {
            for line in io::stdin().lines() {
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
        });
        Self::from_channel(rx)
    }

    /// Read lines from a channel; the sender closing is end of input
    pub const fn from_channel(lines: mpsc::Receiver<io::Result<String>>) -> Self {
        Self { lines }
    }

    /// Read one logical message; `None` at end of input.
    ///
    /// A line ending in `\` continues on the next line, prompted with blank
    /// padding as wide as `prompt`.
    pub async fn read_message(&mut self, prompt: &str) -> io::Result<Option<String>> {
        let mut message = MultiLine::default();
        let padding = " ".repeat(prompt.chars().count());
        let mut current = prompt;

        loop {
            print_prompt(current)?;
            let Some(line) = self.lines.recv().await.transpose()? else {
                return Ok(message.finish_at_eof());
            };
            if message.push(&line) {
                return Ok(Some(message.finish()));
            }
            current = &padding;
        }
    }
}

fn print_prompt(prompt: &str) -> io::Result<()> {
    let mut stdout = io::stdout();
    write!(stdout, "{prompt}")?;
    stdout.flush()
}

/// Accumulates continued lines
#[derive(Debug, Default)]
pub struct MultiLine {
    lines: Vec<String>,
}

impl MultiLine {
    /// Add a line; true once the message is complete
    pub fn push(&mut self, line: &str) -> bool {
        let line = line.strip_suffix('\r').unwrap_or(line);
        match line.strip_suffix('\\') {
            Some(head) => {
                self.lines.push(head.to_string());
                false
            }
            None => {
                self.lines.push(line.to_string());
                true
            }
        }
    }

    pub fn finish(self) -> String {
        self.lines.join("\n")
    }

    /// Input ended mid-message: keep what was typed, if anything
    fn finish_at_eof(self) -> Option<String> {
        (!self.lines.is_empty()).then(|| self.finish())
    }
}

/// The interactive chat shell
pub struct Repl {
    store: SessionStore,
    turn: TurnLoop,
    input: InputReader,
}

impl Repl {
    pub fn new(
        store: SessionStore,
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        config: TurnConfig,
    ) -> Self {
        Self {
            store,
            turn: TurnLoop::new(provider, tools, config),
            input: InputReader::stdin(),
        }
    }

    /// Run until the user quits
    pub async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            let line = tokio::select! {
                line = self.input.read_message(PROMPT) => line?,
                _ = tokio::signal::ctrl_c() => None,
            };

            let Some(line) = line else {
                println!();
                println!("Exiting...");
                return Ok(());
            };

            let mut out = io::stdout();
            match Command::parse(&line) {
                Command::Quit => return Ok(()),
                Command::Help => commands::help(&mut out)?,
                Command::New => commands::new_session(&mut self.store, &mut out)?,
                Command::List => commands::list_sessions(&self.store, &mut out)?,
                Command::Select => {
                    commands::list_sessions(&self.store, &mut out)?;
                    if let Some(id) = self.ask("Enter the session ID to select: ").await? {
                        commands::select_session(&mut self.store, &id, &mut out)?;
                    }
                }
                Command::Delete => {
                    commands::list_sessions(&self.store, &mut out)?;
                    if let Some(id) = self.ask("Enter the session ID to delete: ").await? {
                        commands::delete_session(&mut self.store, &id, &mut out)?;
                    }
                }
                Command::ToggleTools => commands::toggle_tools(&mut self.store, &mut out)?,
                Command::ListTools => commands::list_tools(self.turn.tools(), &mut out)?,
                Command::Model => {
                    match self.turn.provider().list_models().await {
                        Ok(models) => commands::list_models(&models, &mut out)?,
                        Err(e) => {
                            tracing::warn!(error = %e, "Could not list models");
                            writeln!(out, "{}", e.user_message())?;
                        }
                    }
                    if let Some(model) = self.ask("Enter the model ID to switch: ").await? {
                        commands::switch_model(&mut self.store, &model, &mut out)?;
                    }
                }
                Command::Empty => writeln!(out, "{}", ChatError::EmptyMessage.user_message())?,
                Command::Message(message) => self.chat(&message).await,
            }
        }
    }

    async fn ask(&mut self, prompt: &str) -> io::Result<Option<String>> {
        tokio::select! {
            answer = self.input.read_message(prompt) => answer,
            _ = tokio::signal::ctrl_c() => {
                println!();
                Ok(None)
            }
        }
    }

    /// Run one turn on the current session, printing as it streams
    async fn chat(&mut self, message: &str) {
        let mut sink = ConsoleSink::new(io::stdout());
        let conversation = self.store.current_mut();

        let result = tokio::select! {
            result = self.turn.run(conversation, message, &mut sink) => Some(result),
            _ = tokio::signal::ctrl_c() => None,
        };

        match result {
            Some(Ok(outcome)) => {
                if outcome.tool_calls > 0 {
                    if let Some(reply) = &outcome.reply {
                        println!("\n\nFinal response:\n{reply}");
                    }
                }
                println!();
            }
            Some(Err(e)) => {
                tracing::error!(error = %e, "Turn failed");
                println!("\n{}", e.user_message());
            }
            None => println!("\nInterrupted."),
        }
    }
}
