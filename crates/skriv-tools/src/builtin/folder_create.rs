// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};

use skriv_config::Mode;
use skriv_events::KbChangeKind;

use crate::context::ToolContext;
use crate::tool::{Tool, ToolCall, ToolOutput};

pub struct FolderCreateTool;

#[async_trait]
impl Tool for FolderCreateTool {
    fn name(&self) -> &str {
        "folder_create"
    }

    fn description(&self) -> &str {
        "Create a knowledge-base directory (and any missing parents). Creating \
         an existing directory succeeds without recording a change."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "KB-relative directory path" }
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
        if path.is_dir() {
            return ToolOutput::ok(&call.id, format!("'{raw}' already exists"));
        }
        match tokio::fs::create_dir_all(&path).await {
            Ok(()) => {
                ctx.record_change(KbChangeKind::FolderCreated, &path, self.name());
                ToolOutput::ok(&call.id, format!("created folder {raw}"))
            }
            Err(e) => ToolOutput::err(&call.id, format!("mkdir error: {e}")),
        }
    }
}
