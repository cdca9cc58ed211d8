// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};

use skriv_config::Mode;
use skriv_events::KbChangeKind;

use crate::context::ToolContext;
use crate::tool::{Tool, ToolCall, ToolOutput};

pub struct FolderDeleteTool;

#[async_trait]
impl Tool for FolderDeleteTool {
    fn name(&self) -> &str {
        "folder_delete"
    }

    fn description(&self) -> &str {
        "Delete a knowledge-base directory. Refuses non-empty directories \
         unless 'recursive' is true."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "KB-relative directory path" },
                "recursive": { "type": "boolean", "description": "Delete contents too (default false)" }
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
        let recursive = call
            .args
            .get("recursive")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let path = match ctx.resolve(raw) {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(&call.id, e.to_string()),
        };
        if !path.is_dir() {
            return ToolOutput::err(&call.id, format!("'{raw}' is not a directory"));
        }

        let result = if recursive {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_dir(&path).await
        };
        match result {
            Ok(()) => {
                ctx.record_change(KbChangeKind::FolderDeleted, &path, self.name());
                ToolOutput::ok(&call.id, format!("deleted folder {raw}"))
            }
            Err(e) => ToolOutput::err(&call.id, format!("rmdir error: {e}")),
        }
    }
}
