//! Shell Command Tool
//!
//! Runs a command through `sh -c`. The model must pass `confirmation: true`,
//! which it is told to obtain from the user first.

use async_trait::async_trait;
use chat_core::{ParameterSchema, Result as CoreResult, Tool, ToolCall, ToolSchema};
use serde_json::{Value, json};
use tokio::process::Command;

/// Tool for executing shell commands
#[derive(Debug, Default)]
pub struct ShellCommandTool;

impl ShellCommandTool {
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for ShellCommandTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "ShellCommand".into(),
            description: "Execute shell commands with confirmation. \nYou should take user's \
                          confirmation before executing the command."
                .into(),
            parameters: vec![
                ParameterSchema::required("command", "string", "The shell command to execute."),
                ParameterSchema::required(
                    "confirmation",
                    "boolean",
                    "User confirmation to execute command.",
                ),
            ],
            has_side_effects: true,
        }
    }

    async fn execute(&self, call: &ToolCall) -> CoreResult<Value> {
        let command = call
            .arguments
            .get("command")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if command.trim().is_empty() {
            return Ok(json!({ "error": "No command provided." }));
        }

        let confirmed = call
            .arguments
            .get("confirmation")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !confirmed {
            return Ok(json!({
                "error": "You need to take user's confirmation to execute command."
            }));
        }

        tracing::debug!(command, "Executing shell command");

        let output = match Command::new("sh").args(["-c", command]).output().await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(command, error = %e, "Command execution failed");
                return Ok(json!({
                    "error": format!("Command execution failed: {e}"),
                    "stdout": "",
                    "stderr": "",
                    "returncode": 1,
                }));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let returncode = output.status.code().unwrap_or(-1);

        if output.status.success() {
            Ok(json!({
                "stdout": stdout,
                "stderr": stderr,
                "returncode": returncode,
            }))
        } else {
            tracing::warn!(command, exit_code = returncode, "Command failed");
            Ok(json!({
                "error": format!("Command execution failed: {}", output.status),
                "stdout": stdout,
                "stderr": stderr,
                "returncode": returncode,
            }))
        }
    }
}
