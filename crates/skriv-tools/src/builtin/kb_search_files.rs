// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use walkdir::WalkDir;

use crate::context::ToolContext;
use crate::tool::{Tool, ToolCall, ToolOutput};

const MAX_RESULTS: usize = 100;

/// Case-insensitive substring match over file names in the KB tree.
pub struct KbSearchFilesTool;

#[async_trait]
impl Tool for KbSearchFilesTool {
    fn name(&self) -> &str {
        "kb_search_files"
    }

    fn description(&self) -> &str {
        "Find knowledge-base files whose path contains 'query' \
         (case-insensitive). Returns KB-relative paths, at most 100."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Substring to look for in file paths" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> ToolOutput {
        let query = match call.str_arg("query") {
            Ok(q) => q.to_lowercase(),
            Err(out) => return out,
        };

        let root = ctx.kb_root.clone();
        let matches = tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            for entry in WalkDir::new(&root)
                .min_depth(1)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| e.file_name() != ".git")
                .filter_map(Result::ok)
            {
                if !entry.file_type().is_file() {
                    continue;
                }
                let rel = match entry.path().strip_prefix(&root) {
                    Ok(r) => r.display().to_string(),
                    Err(_) => continue,
                };
                if rel.to_lowercase().contains(&query) {
                    out.push(rel);
                    if out.len() >= MAX_RESULTS {
                        break;
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

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use skriv_events::EventBus;

    use super::*;

    #[tokio::test]
    async fn finds_by_path_fragment() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::create_dir_all(root.join("topics/ai/nlp")).unwrap();
        std::fs::write(root.join("topics/ai/nlp/2026-01-01-attention.md"), "x").unwrap();
        std::fs::write(root.join("topics/ai/nlp/2026-01-02-rnn.md"), "x").unwrap();
        let ctx = ToolContext::new(1, "kb", &root, false, "t", Arc::new(EventBus::new()));
        let out = KbSearchFilesTool
            .execute(
                &ToolCall::new("1", "kb_search_files", json!({"query": "ATTENTION"})),
                &ctx,
            )
            .await;
        assert!(!out.is_error);
        assert_eq!(out.content, "topics/ai/nlp/2026-01-01-attention.md");
    }

    #[tokio::test]
    async fn no_matches_reported_plainly() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let ctx = ToolContext::new(1, "kb", &root, false, "t", Arc::new(EventBus::new()));
        let out = KbSearchFilesTool
            .execute(
                &ToolCall::new("1", "kb_search_files", json!({"query": "zzz"})),
                &ctx,
            )
            .await;
        assert_eq!(out.content, "no matches");
    }
}
