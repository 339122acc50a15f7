//! Tool System
//!
//! Tools are built from an explicit registration catalog at startup and
//! invoked by the turn loop when the model requests them mid-stream.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ChatError, Result};

/// Tool call request from the model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool identifier
    pub name: String,

    /// Arguments as key-value pairs
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// Outcome of one tool invocation.
///
/// A payload carrying a non-null `error` field counts as a failure, whatever
/// else it contains.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Tool that was called
    pub name: String,

    /// Whether execution succeeded
    pub success: bool,

    /// Structured data returned by the tool (or the synthetic error object)
    pub payload: Value,

    /// Error message when the tool failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    /// Classify a raw tool payload by its `error` field
    pub fn from_payload(name: impl Into<String>, payload: Value) -> Self {
        let error = payload.get("error").and_then(|e| match e {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        });

        Self {
            name: name.into(),
            success: error.is_none(),
            payload,
            error,
        }
    }

    pub fn failure(name: impl Into<String>, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            name: name.into(),
            success: false,
            payload: serde_json::json!({ "error": error }),
            error: Some(error),
        }
    }
}

/// Parameter definition for tool schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// JSON Schema type (string, number, boolean, object, array)
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,

    /// Default value if not provided
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Enum of allowed values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
}

impl ParameterSchema {
    pub fn required(
        name: impl Into<String>,
        param_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            description: description.into(),
            required: true,
            default: None,
            enum_values: None,
        }
    }

    pub fn optional(
        name: impl Into<String>,
        param_type: impl Into<String>,
        description: impl Into<String>,
        default: Value,
    ) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            description: description.into(),
            required: false,
            default: Some(default),
            enum_values: None,
        }
    }
}

/// Tool definition schema (for model function calling)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to the model)
    pub description: String,

    /// Parameter definitions
    pub parameters: Vec<ParameterSchema>,

    /// Whether tool has side effects
    #[serde(default)]
    pub has_side_effects: bool,
}

impl ToolSchema {
    /// Render the parameter list as a JSON Schema object
    pub fn json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for param in &self.parameters {
            let mut prop = Map::new();
            prop.insert("type".into(), Value::String(param.param_type.clone()));
            prop.insert("description".into(), Value::String(param.description.clone()));
            if let Some(default) = &param.default {
                prop.insert("default".into(), default.clone());
            }
            if let Some(values) = &param.enum_values {
                prop.insert("enum".into(), Value::Array(values.clone()));
            }
            properties.insert(param.name.clone(), Value::Object(prop));

            if param.required {
                required.push(Value::String(param.name.clone()));
            }
        }

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Tool trait - implement to add new capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool's schema for model function calling
    fn schema(&self) -> ToolSchema;

    /// Execute the tool; a payload with an `error` field reports failure
    async fn execute(&self, call: &ToolCall) -> Result<Value>;

    /// Validate arguments before execution (optional)
    fn validate(&self, call: &ToolCall) -> Result<()> {
        let schema = self.schema();

        for param in &schema.parameters {
            if param.required && !call.arguments.contains_key(&param.name) {
                return Err(ChatError::ToolValidation(format!(
                    "Missing required parameter: {}",
                    param.name
                )));
            }
        }

        Ok(())
    }
}

/// Run a tool, converting every way it can go wrong into a failure result.
///
/// Validation errors, returned errors and panics inside the tool future all
/// come back as `{"error": ...}` payloads; nothing propagates to the caller.
pub async fn run_tool(tool: &dyn Tool, call: &ToolCall) -> ToolResult {
    if let Err(e) = tool.validate(call) {
        return ToolResult::failure(&call.name, e.to_string());
    }

    match AssertUnwindSafe(tool.execute(call)).catch_unwind().await {
        Ok(Ok(payload)) => ToolResult::from_payload(&call.name, payload),
        Ok(Err(e)) => ToolResult::failure(&call.name, e.to_string()),
        Err(panic) => {
            let reason = panic_message(panic.as_ref());
            tracing::warn!(tool = %call.name, %reason, "Tool panicked");
            ToolResult::failure(&call.name, format!("Tool crashed: {reason}"))
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".into())
}

type ToolConstructor = Box<dyn FnOnce() -> Result<Arc<dyn Tool>> + Send>;

/// One entry of a registration catalog: a tool name and how to build it
pub struct ToolFactory {
    name: String,
    build: ToolConstructor,
}

impl ToolFactory {
    pub fn new<F>(name: impl Into<String>, build: F) -> Self
    where
        F: FnOnce() -> Result<Arc<dyn Tool>> + Send + 'static,
    {
        Self {
            name: name.into(),
            build: Box::new(build),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for ToolFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolFactory").field("name", &self.name).finish_non_exhaustive()
    }
}

/// A tool that was skipped while loading the registry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolLoadError {
    pub name: String,
    pub reason: String,
}

impl std::fmt::Display for ToolLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.reason)
    }
}

/// Registry for available tools
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub const fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Build a registry from a catalog.
    ///
    /// A factory that fails, or that produces a name already taken, is
    /// logged and skipped; the remaining factories still load.
    pub fn load(catalog: impl IntoIterator<Item = ToolFactory>) -> (Self, Vec<ToolLoadError>) {
        let mut registry = Self::new();
        let mut errors = Vec::new();

        for factory in catalog {
            let ToolFactory { name, build } = factory;
            match build() {
                Ok(tool) => {
                    let registered = tool.schema().name;
                    if registry.tools.contains_key(&registered) {
                        errors.push(ToolLoadError {
                            name,
                            reason: format!("duplicate tool name '{registered}'"),
                        });
                        continue;
                    }
                    tracing::debug!(tool = %registered, "Loaded tool");
                    registry.tools.insert(registered, tool);
                }
                Err(e) => errors.push(ToolLoadError {
                    name,
                    reason: e.to_string(),
                }),
            }
        }

        if !errors.is_empty() {
            tracing::error!(
                errors = ?errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "Error loading tools"
            );
        }

        (registry, errors)
    }

    /// Register a new tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        let schema = tool.schema();
        self.tools.insert(schema.name, Arc::new(tool));
    }

    /// Get a tool by its exact name
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Schemas of every registered tool, in name order
    pub fn export_schemas(&self) -> Vec<ToolSchema> {
        self.tools.values().map(|t| t.schema()).collect()
    }

    /// Get tool names
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "Echo".into(),
                description: "Echo the text back".into(),
                parameters: vec![ParameterSchema::required("text", "string", "Text to echo")],
                has_side_effects: false,
            }
        }

        async fn execute(&self, call: &ToolCall) -> Result<Value> {
            Ok(serde_json::json!({ "echo": call.arguments["text"] }))
        }
    }

    struct PanickingTool;

    #[async_trait]
    impl Tool for PanickingTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "Boom".into(),
                description: "Always panics".into(),
                parameters: vec![],
                has_side_effects: false,
            }
        }

        async fn execute(&self, _call: &ToolCall) -> Result<Value> {
            panic!("kaboom")
        }
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_tool_registry() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        registry.register(PanickingTool);

        assert_eq!(registry.len(), 2);
        assert!(registry.lookup("Echo").is_some());
        assert!(registry.lookup("echo").is_none());
        assert_eq!(registry.names(), vec!["Boom", "Echo"]);
    }

    #[test]
    fn load_skips_failing_factories() {
        let catalog = vec![
            ToolFactory::new("Broken", || Err(ChatError::Config("no client".into()))),
            ToolFactory::new("Echo", || Ok(Arc::new(EchoTool) as Arc<dyn Tool>)),
            ToolFactory::new("EchoAgain", || Ok(Arc::new(EchoTool) as Arc<dyn Tool>)),
        ];

        let (registry, errors) = ToolRegistry::load(catalog);

        assert_eq!(registry.names(), vec!["Echo"]);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].name, "Broken");
        assert!(errors[0].reason.contains("no client"));
        assert!(errors[1].reason.contains("duplicate"));
    }

    #[test]
    fn json_schema_lists_required_parameters() {
        let schema = ToolSchema {
            name: "Requests".into(),
            description: "Send web requests".into(),
            parameters: vec![
                ParameterSchema::required("url", "string", "The URL"),
                ParameterSchema::optional(
                    "method",
                    "string",
                    "HTTP method",
                    serde_json::json!("GET"),
                ),
            ],
            has_side_effects: true,
        };

        let json = schema.json_schema();
        assert_eq!(json["type"], "object");
        assert_eq!(json["required"], serde_json::json!(["url"]));
        assert_eq!(json["properties"]["method"]["default"], "GET");
    }

    #[test]
    fn payload_with_error_field_is_failure() {
        let ok = ToolResult::from_payload("Search", serde_json::json!({"title": "Rust"}));
        assert!(ok.success);
        assert!(ok.error.is_none());

        let failed =
            ToolResult::from_payload("Search", serde_json::json!({"error": "No query provided."}));
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("No query provided."));

        let null_error = ToolResult::from_payload("Search", serde_json::json!({"error": null}));
        assert!(null_error.success);
    }

    #[tokio::test]
    async fn run_tool_success() {
        let call = ToolCall::new("Echo", args(serde_json::json!({"text": "hi"})));
        let result = run_tool(&EchoTool, &call).await;
        assert!(result.success);
        assert_eq!(result.payload, serde_json::json!({"echo": "hi"}));
    }

    #[tokio::test]
    async fn run_tool_reports_validation_failure() {
        let call = ToolCall::new("Echo", Map::new());
        let result = run_tool(&EchoTool, &call).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Missing required parameter: text"));
    }

    #[tokio::test]
    async fn run_tool_catches_panics() {
        let call = ToolCall::new("Boom", Map::new());
        let result = run_tool(&PanickingTool, &call).await;
        assert!(!result.success);
        assert_eq!(result.payload["error"], "Tool crashed: kaboom");
    }
}
