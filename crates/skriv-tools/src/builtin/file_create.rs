// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use skriv_config::Mode;
use skriv_events::KbChangeKind;

use crate::context::ToolContext;
use crate::tool::{Tool, ToolCall, ToolOutput};

pub struct FileCreateTool;

#[async_trait]
impl Tool for FileCreateTool {
    fn name(&self) -> &str {
        "file_create"
    }

    fn description(&self) -> &str {
        "Create a new file in the knowledge base. Fails when the file already \
         exists — use file_edit to change existing notes. Parent directories \
         are created automatically."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "KB-relative path for the new file" },
                "content": { "type": "string", "description": "File content" }
            },
            "required": ["path", "content"]
        })
    }

    fn modes(&self) -> &[Mode] {
        &[Mode::Agent]
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> ToolOutput {
        let raw = match call.str_arg("path") {
            Ok(p) => p,
            Err(out) => return out,
        };
        let content = match call.str_arg("content") {
            Ok(c) => c,
            Err(out) => return out,
        };
        let path = match ctx.resolve(raw) {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(&call.id, e.to_string()),
        };
        if path.exists() {
            return ToolOutput::err(&call.id, format!("'{raw}' already exists"));
        }

        debug!(path = %path.display(), "file_create");
        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolOutput::err(&call.id, format!("cannot create parent dirs: {e}"));
            }
        }
        match tokio::fs::write(&path, content).await {
            Ok(()) => {
                ctx.record_change(KbChangeKind::FileCreated, &path, self.name());
                ToolOutput::ok(&call.id, format!("created {raw} ({} bytes)", content.len()))
            }
            Err(e) => ToolOutput::err(&call.id, format!("write error: {e}")),
        }
    }
}
