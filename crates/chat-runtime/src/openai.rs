//! OpenAI-compatible LLM Provider
//!
//! Implementation of `LlmProvider` for `/chat/completions` with SSE
//! streaming. Each `data:` event is split into core stream chunks: the text
//! delta first, then one chunk per tool-call delta in array order, then the
//! finish reason.

use async_trait::async_trait;
use chat_core::{
    error::{ChatError, Result},
    message::{Message, Role},
    provider::{ChunkStream, FinishReason, LlmProvider, ModelInfo, ModelRequest, StreamChunk},
    tool::ToolSchema,
};
use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::config::OpenAiConfig;

const STREAM_BUFFER: usize = 64;

/// OpenAI-compatible provider
pub struct OpenAiProvider {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiProvider {
    /// Create from configuration
    pub fn from_config(config: OpenAiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.timeout())
            .build()
            .map_err(|e| ChatError::Config(format!("HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_config(OpenAiConfig::from_env()?)
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.config.api_key.is_empty() {
            request
        } else {
            request.bearer_auth(&self.config.api_key)
        }
    }

    /// Convert chat messages to API format
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage<'_>> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::System | Role::Tool => "system", // Tool results ride as system context
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                content: &m.content,
            })
            .collect()
    }

    /// Convert tool schemas to the function-calling format
    fn to_api_tools(tools: &[ToolSchema]) -> Vec<ApiTool> {
        tools
            .iter()
            .map(|t| ApiTool {
                kind: "function",
                function: ApiFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.json_schema(),
                },
            })
            .collect()
    }

    fn request_body(request: &ModelRequest) -> ApiRequest<'_> {
        ApiRequest {
            model: &request.model,
            messages: Self::to_api_messages(&request.messages),
            stream: true,
            tools: request.tools.as_deref().map(Self::to_api_tools),
        }
    }
}

/// Map HTTP failures to chat errors
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::warn!(status = status.as_u16(), body = %body, "Provider returned error");

    Err(match status.as_u16() {
        401 | 403 => ChatError::Auth(body),
        429 => ChatError::RateLimited(body),
        500..=599 => ChatError::ProviderUnavailable(format!("{status}: {body}")),
        _ => ChatError::Provider(format!("{status}: {body}")),
    })
}

/// Split one SSE `data:` payload into stream chunks
fn decode_event(data: &str) -> Result<Vec<StreamChunk>> {
    let parsed: ApiStreamResponse = serde_json::from_str(data)?;
    let Some(choice) = parsed.choices.into_iter().next() else {
        return Ok(Vec::new());
    };

    let mut chunks = Vec::new();

    if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
        chunks.push(StreamChunk::Text(content));
    }

    for delta in choice.delta.tool_calls.unwrap_or_default() {
        let function = delta.function.unwrap_or_default();
        chunks.push(StreamChunk::ToolCallDelta {
            index: delta.index,
            name: function.name,
            arguments: function.arguments.unwrap_or_default(),
        });
    }

    if let Some(reason) = choice.finish_reason {
        chunks.push(StreamChunk::Finish(FinishReason::parse(&reason)));
    }

    Ok(chunks)
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn health_check(&self) -> Result<bool> {
        let request = self
            .authorized(self.client.get(self.url("models")))
            .timeout(self.config.timeout());

        match request.send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                tracing::warn!("OpenAI health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn complete_stream(&self, request: &ModelRequest) -> Result<ChunkStream> {
        let body = Self::request_body(request);

        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = body.tools.as_ref().map_or(0, Vec::len),
            "Sending streaming request"
        );

        let response = self
            .authorized(self.client.post(self.url("chat/completions")))
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::ProviderUnavailable(e.to_string()))?;
        let response = check_status(response).await?;

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let idle = self.config.timeout();

        // Read the SSE byte stream in the background; dropping the receiver
        // stops the reader at its next send.
        tokio::spawn(async move {
            let mut events = response.bytes_stream().eventsource();

            loop {
                let event = match tokio::time::timeout(idle, events.next()).await {
                    Ok(Some(Ok(event))) => event,
                    Ok(Some(Err(e))) => {
                        let _ = tx.send(Err(ChatError::Stream(e.to_string()))).await;
                        return;
                    }
                    Ok(None) => return,
                    Err(_) => {
                        let message = format!("no data received for {}s", idle.as_secs());
                        let _ = tx.send(Err(ChatError::Stream(message))).await;
                        return;
                    }
                };

                let data = event.data.trim();
                if data == "[DONE]" {
                    return;
                }

                match decode_event(data) {
                    Ok(chunks) => {
                        for chunk in chunks {
                            if tx.send(Ok(chunk)).await.is_err() {
                                tracing::debug!("Stream receiver dropped");
                                return;
                            }
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, data, "Skipping undecodable stream event"),
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let response = self
            .authorized(self.client.get(self.url("models")))
            .timeout(self.config.timeout())
            .send()
            .await
            .map_err(|e| ChatError::ProviderUnavailable(e.to_string()))?;

        let list: ApiModelList = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ChatError::Provider(format!("invalid model list: {e}")))?;

        Ok(list.data)
    }
}

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ApiTool>>,
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ApiTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: ApiFunction,
}

#[derive(Debug, Serialize)]
struct ApiFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiModelList {
    #[serde(default)]
    data: Vec<ModelInfo>,
}

/// A single SSE `data: {...}` event from a streaming response
#[derive(Debug, Deserialize)]
struct ApiStreamResponse {
    #[serde(default)]
    choices: Vec<ApiStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiStreamChoice {
    #[serde(default)]
    delta: ApiStreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiStreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ApiToolCallDelta {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    function: Option<ApiFunctionDelta>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}
