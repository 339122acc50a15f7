//! chat-cli
//!
//! Interactive terminal chat against an OpenAI-compatible API. Replies
//! stream as they are generated, and the model can call the built-in tools
//! (web search, HTTP requests, shell commands) in the middle of a reply.

mod commands;
mod console;
mod repl;

use std::sync::Arc;

use chat_core::{LlmProvider, SessionStore, ToolRegistry};
use chat_runtime::{ChatConfig, OpenAiConfig, OpenAiProvider};
use chat_tools::{ToolsConfig, builtin_catalog};
use clap::Parser;

use crate::repl::Repl;

#[derive(Parser)]
#[command(name = "chat-cli", about = "Streaming chat with tool calling", version)]
struct Cli {
    /// Model for new sessions (overrides CHAT_MODEL)
    #[arg(long)]
    model: Option<String>,

    /// API base URL (overrides OPENAI_BASE_URL)
    #[arg(long)]
    base_url: Option<String>,

    /// Start sessions with tools disabled
    #[arg(long)]
    no_tools: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing; stderr keeps logs out of the chat output
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let mut chat_config = ChatConfig::from_env()?;
    if let Some(model) = cli.model {
        chat_config.model = model;
    }
    chat_config.tools_enabled = !cli.no_tools;

    let openai_config = match cli.base_url {
        Some(base_url) => OpenAiConfig::from_lookup(|key| match key {
            "OPENAI_BASE_URL" => Some(base_url.clone()),
            other => std::env::var(other).ok(),
        })?,
        None => OpenAiConfig::from_env()?,
    };
    tracing::debug!(config = ?openai_config, "Provider configuration");

    // Initialize LLM provider
    let provider = Arc::new(OpenAiProvider::from_config(openai_config)?);
    match provider.health_check().await {
        Ok(true) => tracing::info!("Connected to {}", provider.config().base_url),
        Ok(false) | Err(_) => {
            tracing::warn!(
                "Model API at {} is not reachable - chat requests will fail",
                provider.config().base_url
            );
        }
    }

    // Initialize tools
    let (tools, load_errors) = ToolRegistry::load(builtin_catalog(&ToolsConfig::from_env()));
    for error in &load_errors {
        eprintln!("Tool not loaded: {error}");
    }
    tracing::info!(tools = ?tools.names(), "Registered {} tools", tools.len());

    let store = SessionStore::new(chat_config.model.clone(), chat_config.tools_enabled);
    println!("Created new session: {}", store.current_id());

    let mut repl = Repl::new(
        store,
        provider,
        Arc::new(tools),
        chat_config.turn_config(),
    );
    repl.run().await
}
