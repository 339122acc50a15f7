//! Search Tool
//!
//! Looks a query up on the DuckDuckGo instant-answer API and returns the
//! first hit.

use async_trait::async_trait;
use chat_core::{ParameterSchema, Result as CoreResult, Tool, ToolCall, ToolSchema};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::ToolError;

pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://api.duckduckgo.com/";

/// Tool for searching the web
pub struct SearchTool {
    client: reqwest::Client,
    endpoint: String,
}

impl SearchTool {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    async fn search(&self, query: &str) -> Result<Option<SearchHit>, ToolError> {
        let response: InstantAnswer = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(first_hit(response))
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "Search".into(),
            description: "Search the web for information.".into(),
            parameters: vec![ParameterSchema::required(
                "query",
                "string",
                "The search query.",
            )],
            has_side_effects: false,
        }
    }

    async fn execute(&self, call: &ToolCall) -> CoreResult<Value> {
        let query = call
            .arguments
            .get("query")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default();

        if query.is_empty() {
            return Ok(json!({ "error": "No query provided." }));
        }

        tracing::debug!(query, "Searching");

        match self.search(query).await? {
            Some(hit) => Ok(serde_json::to_value(hit)?),
            None => Ok(json!({ "error": "No results found." })),
        }
    }
}

/// One search result
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub title: String,
    pub href: String,
    pub body: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstantAnswer {
    #[serde(default)]
    heading: String,
    #[serde(default)]
    abstract_text: String,
    #[serde(default, rename = "AbstractURL")]
    abstract_url: String,
    #[serde(default)]
    related_topics: Vec<RelatedTopic>,
}

/// Either a plain topic or a named group of topics
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RelatedTopic {
    #[serde(default)]
    text: String,
    #[serde(default, rename = "FirstURL")]
    first_url: String,
    #[serde(default)]
    topics: Vec<RelatedTopic>,
}

/// The abstract if there is one, else the first related topic (groups
/// flattened in order)
fn first_hit(answer: InstantAnswer) -> Option<SearchHit> {
    if !answer.abstract_text.is_empty() {
        return Some(SearchHit {
            title: answer.heading,
            href: answer.abstract_url,
            body: answer.abstract_text,
        });
    }

    let mut topics = Vec::new();
    flatten(answer.related_topics, &mut topics);

    topics.into_iter().next().map(|topic| SearchHit {
        title: topic
            .text
            .split(" - ")
            .next()
            .unwrap_or_default()
            .to_string(),
        href: topic.first_url,
        body: topic.text,
    })
}

fn flatten(topics: Vec<RelatedTopic>, out: &mut Vec<RelatedTopic>) {
    for mut topic in topics {
        let nested = std::mem::take(&mut topic.topics);
        if !topic.text.is_empty() {
            out.push(topic);
        }
        flatten(nested, out);
    }
}
