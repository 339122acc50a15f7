//! Requests Tool
//!
//! Sends an HTTP request on the model's behalf and hands back either the raw
//! response or a short text summary of it.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chat_core::{ParameterSchema, Result as CoreResult, Tool, ToolCall, ToolSchema};
use regex::Regex;
use reqwest::Method;
use serde_json::{Map, Value, json};

use crate::error::ToolError;

/// Summaries longer than this are shortened
pub const SUMMARY_MAX_CHARS: usize = 1000;

const PLACEHOLDER: &str = "...";

/// Tool for sending web requests
pub struct RequestsTool {
    client: reqwest::Client,
    html: HtmlText,
}

impl RequestsTool {
    pub fn new(client: reqwest::Client) -> Result<Self, ToolError> {
        Ok(Self {
            client,
            html: HtmlText::new()?,
        })
    }

    fn build_request(&self, call: &ToolCall) -> Result<reqwest::RequestBuilder, String> {
        let args = &call.arguments;

        let url = args.get("url").and_then(Value::as_str).unwrap_or_default();
        if url.is_empty() {
            return Err("No URL provided.".into());
        }

        let method = args.get("method").and_then(Value::as_str).unwrap_or("GET");
        let method = Method::from_bytes(method.to_uppercase().as_bytes())
            .map_err(|_| format!("Request failed: invalid method '{method}'"))?;

        let mut request = self.client.request(method, url);

        if let Some(headers) = args.get("headers").and_then(Value::as_object) {
            for (name, value) in headers {
                request = request.header(name.as_str(), plain_string(value));
            }
        }

        if let Some(data) = args.get("data").and_then(Value::as_object) {
            if !data.is_empty() {
                let form: BTreeMap<&str, String> = data
                    .iter()
                    .map(|(k, v)| (k.as_str(), plain_string(v)))
                    .collect();
                request = request.form(&form);
            }
        }

        Ok(request)
    }

    async fn raw(response: reqwest::Response) -> Result<Value, ToolError> {
        let status_code = response.status().as_u16();
        let headers: Map<String, Value> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    Value::String(String::from_utf8_lossy(value.as_bytes()).into_owned()),
                )
            })
            .collect();
        let content = response.text().await?;

        Ok(json!({
            "status_code": status_code,
            "headers": headers,
            "content": content,
        }))
    }

    async fn summarize(&self, response: reqwest::Response) -> Result<Value, ToolError> {
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_lowercase();
        let body = response.text().await?;

        let summary = if content_type.contains("text/html") {
            shorten(&self.html.extract(&body), SUMMARY_MAX_CHARS)
        } else if content_type.contains("application/json") {
            let parsed: Value = serde_json::from_str(&body)?;
            format!("JSON response: {parsed}")
        } else {
            shorten(&body, SUMMARY_MAX_CHARS)
        };

        Ok(json!({ "summary": summary }))
    }
}

#[async_trait]
impl Tool for RequestsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "Requests".into(),
            description: "Send web requests and process the response.".into(),
            parameters: vec![
                ParameterSchema::required("url", "string", "The URL to send the request to."),
                ParameterSchema::optional(
                    "method",
                    "string",
                    "The HTTP method to use.",
                    json!("GET"),
                ),
                ParameterSchema::optional(
                    "headers",
                    "object",
                    "The headers to send with the request.",
                    json!({}),
                ),
                ParameterSchema::optional(
                    "data",
                    "object",
                    "The data to send with the request.",
                    json!({}),
                ),
                ParameterSchema::optional(
                    "raw_response",
                    "boolean",
                    "If True, return the raw response (status code, headers, text).",
                    json!(false),
                ),
            ],
            has_side_effects: true,
        }
    }

    async fn execute(&self, call: &ToolCall) -> CoreResult<Value> {
        let request = match self.build_request(call) {
            Ok(request) => request,
            Err(message) => return Ok(json!({ "error": message })),
        };

        let response = match request.send().await.and_then(reqwest::Response::error_for_status) {
            Ok(response) => response,
            Err(e) => return Ok(json!({ "error": format!("Request failed: {e}") })),
        };

        tracing::debug!(
            url = %response.url(),
            status = response.status().as_u16(),
            "Request completed"
        );

        let raw_response = call
            .arguments
            .get("raw_response")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let payload = if raw_response {
            Self::raw(response).await?
        } else {
            self.summarize(response).await?
        };

        Ok(payload)
    }
}

/// Strings stay unquoted, everything else is rendered as JSON
fn plain_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Visible text of an HTML page
struct HtmlText {
    hidden: Regex,
    tags: Regex,
}

impl HtmlText {
    fn new() -> Result<Self, ToolError> {
        Ok(Self {
            hidden: Regex::new(concat!(
                r"(?is)<(script|style|noscript|template)\b.*?",
                r"</(script|style|noscript|template)\s*>|<!--.*?-->",
            ))?,
            tags: Regex::new(r"(?s)<[^>]*>")?,
        })
    }

    fn extract(&self, html: &str) -> String {
        let visible = self.hidden.replace_all(html, " ");
        let text = self.tags.replace_all(&visible, " ");
        let text = decode_entities(&text);
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Collapse whitespace and cut at a word boundary so that the result,
/// placeholder included, fits in `max_chars`. Text already short enough is
/// returned untouched.
pub fn shorten(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let budget = max_chars.saturating_sub(PLACEHOLDER.len());
    let mut out = String::new();
    let mut used = 0;

    for word in text.split_whitespace() {
        let sep = usize::from(!out.is_empty());
        let len = word.chars().count();
        if used + sep + len > budget {
            break;
        }
        if sep == 1 {
            out.push(' ');
        }
        out.push_str(word);
        used += sep + len;
    }

    out.push_str(PLACEHOLDER);
    out
}
