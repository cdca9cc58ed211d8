// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use regex::RegexBuilder;
use serde_json::{json, Value};
use walkdir::WalkDir;

use crate::context::ToolContext;
use crate::tool::{Tool, ToolCall, ToolOutput};

const MAX_MATCHES: usize = 50;

/// Regex search through the text files of the KB, grep-style output
/// `path:line: text`.
pub struct KbSearchContentTool;

#[async_trait]
impl Tool for KbSearchContentTool {
    fn name(&self) -> &str {
        "kb_search_content"
    }

    fn description(&self) -> &str {
        "Search note contents with a regular expression. Returns matches as \
         'path:line: text', at most 50. Set 'case_sensitive' to true for exact \
         case matching."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Regular expression" },
                "case_sensitive": { "type": "boolean", "description": "Default false" }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> ToolOutput {
        let pattern = match call.str_arg("pattern") {
            Ok(p) => p.to_string(),
            Err(out) => return out,
        };
        let case_sensitive = call
            .args
            .get("case_sensitive")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let re = match RegexBuilder::new(&pattern)
            .case_insensitive(!case_sensitive)
            .build()
        {
            Ok(re) => re,
            Err(e) => return ToolOutput::err(&call.id, format!("invalid pattern: {e}")),
        };

        let root = ctx.kb_root.clone();
        let matches = tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            'files: for entry in WalkDir::new(&root)
                .min_depth(1)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| e.file_name() != ".git")
                .filter_map(Result::ok)
            {
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(text) = std::fs::read_to_string(entry.path()) else {
                    continue; // binary or unreadable
                };
                let rel = entry
                    .path()
                    .strip_prefix(&root)
                    .unwrap_or(entry.path())
                    .display()
                    .to_string();
                for (lineno, line) in text.lines().enumerate() {
                    if re.is_match(line) {
                        out.push(format!("{rel}:{}: {}", lineno + 1, line.trim()));
                        if out.len() >= MAX_MATCHES {
                            break 'files;
                        }
                    }
                }
            }
            out
        })
        .await
        .unwrap_or_default();

        if matches.is_empty() {
            return ToolOutput::ok(&call.id, "no matches");
        }
        ToolOutput::ok(&call.id, matches.join("\n"))
    }
}
