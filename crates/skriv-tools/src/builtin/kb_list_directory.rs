// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::ToolContext;
use crate::tool::{Tool, ToolCall, ToolOutput};

pub struct KbListDirectoryTool;

#[async_trait]
impl Tool for KbListDirectoryTool {
    fn name(&self) -> &str {
        "kb_list_directory"
    }

    fn description(&self) -> &str {
        "List a knowledge-base directory. 'path' is relative to the KB root; \
         use 'topics' to see the category tree. Directories are suffixed with /."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "KB-relative directory (default: KB root)" }
            }
        })
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> ToolOutput {
        let raw = call
            .args
            .get("path")
            .and_then(|v| v.as_str())
            .unwrap_or(".");
        let path = match ctx.resolve_for_read(raw) {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(&call.id, e.to_string()),
        };

        let mut rd = match tokio::fs::read_dir(&path).await {
            Ok(rd) => rd,
            Err(e) => return ToolOutput::err(&call.id, format!("cannot list '{raw}': {e}")),
        };

        let mut entries = Vec::new();
        while let Ok(Some(entry)) = rd.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            // The git dir and the lock file are infrastructure, not content.
            if name == ".git" || name == ".lock" {
                continue;
            }
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            entries.push(if is_dir { format!("{name}/") } else { name });
        }
        entries.sort();
        if entries.is_empty() {
            return ToolOutput::ok(&call.id, "(empty)");
        }
        ToolOutput::ok(&call.id, entries.join("\n"))
    }
}
