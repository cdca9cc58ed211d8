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

pub struct FileEditTool;

#[async_trait]
impl Tool for FileEditTool {
    fn name(&self) -> &str {
        "file_edit"
    }

    fn description(&self) -> &str {
        "Edit an existing knowledge-base file. With 'old_text' set, replaces its \
         first occurrence with 'new_text' (old_text must appear in the file). \
         Without 'old_text', the whole file is overwritten with 'new_text'."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "KB-relative file path" },
                "old_text": { "type": "string", "description": "Exact text to replace (optional)" },
                "new_text": { "type": "string", "description": "Replacement or full new content" }
            },
            "required": ["path", "new_text"]
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
        let new_text = match call.str_arg("new_text") {
            Ok(t) => t,
            Err(out) => return out,
        };
        let old_text = call.args.get("old_text").and_then(|v| v.as_str());

        let path = match ctx.resolve(raw) {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(&call.id, e.to_string()),
        };
        let current = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => return ToolOutput::err(&call.id, format!("cannot read '{raw}': {e}")),
        };

        let updated = match old_text {
            Some(old) => {
                if !current.contains(old) {
                    return ToolOutput::err(
                        &call.id,
                        format!("old_text not found in '{raw}'; read the file and retry"),
                    );
                }
                current.replacen(old, new_text, 1)
            }
            None => new_text.to_string(),
        };

        debug!(path = %path.display(), "file_edit");
        match tokio::fs::write(&path, &updated).await {
            Ok(()) => {
                ctx.record_change(KbChangeKind::FileModified, &path, self.name());
                ToolOutput::ok(&call.id, format!("edited {raw}"))
            }
            Err(e) => ToolOutput::err(&call.id, format!("write error: {e}")),
        }
    }
}
