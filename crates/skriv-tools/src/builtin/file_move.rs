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

pub struct FileMoveTool;

#[async_trait]
impl Tool for FileMoveTool {
    fn name(&self) -> &str {
        "file_move"
    }

    fn description(&self) -> &str {
        "Move or rename a knowledge-base file. Both 'from' and 'to' are \
         KB-relative; missing destination directories are created. Fails when \
         the destination already exists."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "from": { "type": "string", "description": "Current KB-relative path" },
                "to": { "type": "string", "description": "New KB-relative path" }
            },
            "required": ["from", "to"]
        })
    }

    fn modes(&self) -> &[Mode] {
        &[Mode::Agent]
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> ToolOutput {
        let raw_from = match call.str_arg("from") {
            Ok(p) => p,
            Err(out) => return out,
        };
        let raw_to = match call.str_arg("to") {
            Ok(p) => p,
            Err(out) => return out,
        };
        let from = match ctx.resolve(raw_from) {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(&call.id, e.to_string()),
        };
        let to = match ctx.resolve(raw_to) {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(&call.id, e.to_string()),
        };
        if !from.is_file() {
            return ToolOutput::err(&call.id, format!("'{raw_from}' is not a file"));
        }
        if to.exists() {
            return ToolOutput::err(&call.id, format!("'{raw_to}' already exists"));
        }
        if let Some(parent) = to.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolOutput::err(&call.id, format!("cannot create parent dirs: {e}"));
            }
        }

        debug!(from = %from.display(), to = %to.display(), "file_move");
        match tokio::fs::rename(&from, &to).await {
            Ok(()) => {
                // A file move is a delete at the source and a create at the
                // destination as far as indexers are concerned.
                ctx.record_change(KbChangeKind::FileDeleted, &from, self.name());
                ctx.record_change(KbChangeKind::FileCreated, &to, self.name());
                ToolOutput::ok(&call.id, format!("moved {raw_from} → {raw_to}"))
            }
            Err(e) => ToolOutput::err(&call.id, format!("move error: {e}")),
        }
    }
}
