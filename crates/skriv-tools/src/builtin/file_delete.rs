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

pub struct FileDeleteTool;

#[async_trait]
impl Tool for FileDeleteTool {
    fn name(&self) -> &str {
        "file_delete"
    }

    fn description(&self) -> &str {
        "Delete a file from the knowledge base. The path must name an existing \
         file; directories are removed with folder_delete."
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

    fn modes(&self) -> &[Mode] {
        &[Mode::Agent]
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> ToolOutput {
        let raw = match call.str_arg("path") {
            Ok(p) => p,
            Err(out) => return out,
        };
        let path = match ctx.resolve(raw) {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(&call.id, e.to_string()),
        };
        if !path.is_file() {
            return ToolOutput::err(&call.id, format!("'{raw}' is not a file"));
        }

        debug!(path = %path.display(), "file_delete");
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                ctx.record_change(KbChangeKind::FileDeleted, &path, self.name());
                ToolOutput::ok(&call.id, format!("deleted {raw}"))
            }
            Err(e) => ToolOutput::err(&call.id, format!("delete error: {e}")),
        }
    }
}
