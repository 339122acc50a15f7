//! Registration catalog for the built-in tools

use std::sync::Arc;
use std::time::Duration;

use chat_core::{ChatError, Result, Tool, ToolFactory};

use crate::request::RequestsTool;
use crate::search::{DEFAULT_SEARCH_ENDPOINT, SearchTool};
use crate::shell::ShellCommandTool;

pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Settings shared by the built-in tools
#[derive(Clone, Debug)]
pub struct ToolsConfig {
    /// Instant-answer endpoint used by `Search`
    pub search_endpoint: String,

    /// Per-request timeout for `Search` and `Requests`
    pub http_timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            search_endpoint: DEFAULT_SEARCH_ENDPOINT.into(),
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

impl ToolsConfig {
    pub fn from_env() -> Self {
        let search_endpoint = std::env::var("CHAT_SEARCH_ENDPOINT")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SEARCH_ENDPOINT.into());

        Self {
            search_endpoint,
            ..Default::default()
        }
    }
}

fn http_client(name: &str, timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("chat-cli/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ChatError::ToolLoad {
            name: name.into(),
            reason: e.to_string(),
        })
}

/// Every built-in tool, in registration order
pub fn builtin_catalog(config: &ToolsConfig) -> Vec<ToolFactory> {
    let search = config.clone();
    let requests = config.clone();

    vec![
        ToolFactory::new("Search", move || {
            let client = http_client("Search", search.http_timeout_secs)?;
            Ok(Arc::new(SearchTool::new(client, search.search_endpoint)) as Arc<dyn Tool>)
        }),
        ToolFactory::new("Requests", move || {
            let client = http_client("Requests", requests.http_timeout_secs)?;
            let tool = RequestsTool::new(client).map_err(|e| ChatError::ToolLoad {
                name: "Requests".into(),
                reason: e.to_string(),
            })?;
            Ok(Arc::new(tool) as Arc<dyn Tool>)
        }),
        ToolFactory::new("ShellCommand", || {
            Ok(Arc::new(ShellCommandTool::new()) as Arc<dyn Tool>)
        }),
    ]
}
