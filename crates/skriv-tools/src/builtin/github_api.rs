// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::context::ToolContext;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Read-only GitHub REST access.  Only GET requests to api.github.com are
/// allowed; anything else is a tool error.
pub struct GithubApiTool {
    pub token: Option<String>,
}

#[async_trait]
impl Tool for GithubApiTool {
    fn name(&self) -> &str {
        "github_api"
    }

    fn description(&self) -> &str {
        "Fetch data from the GitHub REST API (GET only). Pass the path portion \
         as 'path', e.g. /repos/rust-lang/rust/releases/latest. Returns the \
         JSON response body."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "API path beginning with /" }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, call: &ToolCall, _ctx: &ToolContext) -> ToolOutput {
        let path = match call.str_arg("path") {
            Ok(p) => p,
            Err(out) => return out,
        };
        if !path.starts_with('/') || path.contains("://") {
            return ToolOutput::err(
                &call.id,
                "'path' must be an API path like /repos/<owner>/<repo>, not a URL",
            );
        }

        debug!(path, "github_api");
        let mut req = reqwest::Client::new()
            .get(format!("https://api.github.com{path}"))
            .header("User-Agent", "skriv")
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = match req.send().await {
            Ok(r) => r,
            Err(e) => return ToolOutput::err(&call.id, format!("request failed: {e}")),
        };
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return ToolOutput::err(&call.id, format!("GitHub returned {status}: {body}"));
        }
        ToolOutput::ok(&call.id, body)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use skriv_events::EventBus;

    use super::*;

    #[tokio::test]
    async fn full_url_rejected() {
        let t = GithubApiTool { token: None };
        let ctx = ToolContext::new(1, "kb", "/tmp/kb", false, "t", Arc::new(EventBus::new()));
        let out = t
            .execute(
                &ToolCall::new("1", "github_api", json!({"path": "https://evil.example/x"})),
                &ctx,
            )
            .await;
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn relative_path_rejected() {
        let t = GithubApiTool { token: None };
        let ctx = ToolContext::new(1, "kb", "/tmp/kb", false, "t", Arc::new(EventBus::new()));
        let out = t
            .execute(
                &ToolCall::new("1", "github_api", json!({"path": "repos/a/b"})),
                &ctx,
            )
            .await;
        assert!(out.is_error);
    }
}
