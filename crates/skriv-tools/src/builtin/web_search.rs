// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::context::ToolContext;
use crate::tool::{Tool, ToolCall, ToolOutput};

const DEFAULT_COUNT: u64 = 5;

/// Web search via the Brave Search API.  Needs an API key in config;
/// without one the tool reports itself unusable instead of failing the
/// whole task.
pub struct WebSearchTool {
    pub api_key: Option<String>,
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web and return result titles, URLs and snippets. Use for \
         facts that are newer than the knowledge base or missing from it."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" },
                "count": { "type": "integer", "description": "Results to return (default 5, max 10)" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, call: &ToolCall, _ctx: &ToolContext) -> ToolOutput {
        let query = match call.str_arg("query") {
            Ok(q) => q,
            Err(out) => return out,
        };
        let Some(api_key) = &self.api_key else {
            return ToolOutput::err(
                &call.id,
                "web_search is not configured (tools.web_search_api_key is unset)",
            );
        };
        let count = call
            .args
            .get("count")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_COUNT)
            .min(10);

        debug!(query, "web_search");
        let resp = match reqwest::Client::new()
            .get("https://api.search.brave.com/res/v1/web/search")
            .query(&[("q", query), ("count", &count.to_string())])
            .header("X-Subscription-Token", api_key)
            .header("Accept", "application/json")
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return ToolOutput::err(&call.id, format!("search request failed: {e}")),
        };
        if !resp.status().is_success() {
            return ToolOutput::err(&call.id, format!("search returned {}", resp.status()));
        }
        let body: Value = match resp.json().await {
            Ok(b) => b,
            Err(e) => return ToolOutput::err(&call.id, format!("invalid search response: {e}")),
        };

        let results = body["web"]["results"].as_array().cloned().unwrap_or_default();
        if results.is_empty() {
            return ToolOutput::ok(&call.id, "no results");
        }
        let mut out = String::new();
        for r in results.iter().take(count as usize) {
            let title = r["title"].as_str().unwrap_or("(untitled)");
            let url = r["url"].as_str().unwrap_or("");
            let desc = r["description"].as_str().unwrap_or("");
            out.push_str(&format!("{title}\n  {url}\n  {desc}\n\n"));
        }
        ToolOutput::ok(&call.id, out.trim_end().to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use skriv_events::EventBus;

    use super::*;

    #[tokio::test]
    async fn unconfigured_key_is_tool_error() {
        let t = WebSearchTool { api_key: None };
        let ctx = ToolContext::new(1, "kb", "/tmp/kb", false, "t", Arc::new(EventBus::new()));
        let out = t
            .execute(&ToolCall::new("1", "web_search", json!({"query": "rust"})), &ctx)
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("not configured"));
    }

    #[tokio::test]
    async fn missing_query_is_error() {
        let t = WebSearchTool {
            api_key: Some("k".into()),
        };
        let ctx = ToolContext::new(1, "kb", "/tmp/kb", false, "t", Arc::new(EventBus::new()));
        let out = t
            .execute(&ToolCall::new("1", "web_search", json!({})), &ctx)
            .await;
        assert!(out.is_error);
    }
}
