// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::context::ToolContext;
use crate::tool::{Tool, ToolCall, ToolOutput};

pub struct KbReadFileTool;

#[async_trait]
impl Tool for KbReadFileTool {
    fn name(&self) -> &str {
        "kb_read_file"
    }

    fn description(&self) -> &str {
        "Read a file from the knowledge base. 'path' is relative to the KB root, \
         e.g. topics/ai/2026-01-01-note.md or index.md."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "KB-relative file path" }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> ToolOutput {
        let raw = match call.str_arg("path") {
            Ok(p) => p,
            Err(out) => return out,
        };
        // Reads may reach root-level files (index.md) even under topics-only.
        let path = match ctx.resolve_for_read(raw) {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(&call.id, e.to_string()),
        };
        debug!(path = %path.display(), "kb_read_file");
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => ToolOutput::ok(&call.id, text),
            Err(e) => ToolOutput::err(&call.id, format!("cannot read '{raw}': {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use skriv_events::EventBus;

    use super::*;

    fn ctx(root: &std::path::Path) -> ToolContext {
        ToolContext::new(1, "kb", root, true, "t", Arc::new(EventBus::new()))
    }

    #[tokio::test]
    async fn reads_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::create_dir_all(root.join("topics")).unwrap();
        std::fs::write(root.join("topics/a.md"), "# A\n").unwrap();
        let out = KbReadFileTool
            .execute(
                &ToolCall::new("1", "kb_read_file", json!({"path": "topics/a.md"})),
                &ctx(&root),
            )
            .await;
        assert!(!out.is_error);
        assert_eq!(out.content, "# A\n");
    }

    #[tokio::test]
    async fn missing_file_is_tool_error() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let out = KbReadFileTool
            .execute(
                &ToolCall::new("1", "kb_read_file", json!({"path": "topics/none.md"})),
                &ctx(&root),
            )
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("cannot read"));
    }

    #[tokio::test]
    async fn escape_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let out = KbReadFileTool
            .execute(
                &ToolCall::new("1", "kb_read_file", json!({"path": "../outside.md"})),
                &ctx(&root),
            )
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("escapes"));
    }

    #[tokio::test]
    async fn root_level_read_allowed_under_topics_only() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::write(root.join("index.md"), "# Index\n").unwrap();
        let out = KbReadFileTool
            .execute(
                &ToolCall::new("1", "kb_read_file", json!({"path": "index.md"})),
                &ctx(&root),
            )
            .await;
        assert!(!out.is_error);
    }
}
