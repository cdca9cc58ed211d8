// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::ToolContext;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Cheap structural analysis of raw message content: size, links, headings.
/// Gives the model something to anchor categorisation on before it commits
/// to a note structure.
pub struct AnalyzeContentTool;

#[async_trait]
impl Tool for AnalyzeContentTool {
    fn name(&self) -> &str {
        "analyze_content"
    }

    fn description(&self) -> &str {
        "Analyze a block of text before deciding how to store it: returns line, \
         word and character counts, the URLs it contains, and any markdown \
         headings. Pass the raw content as 'content'."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": { "type": "string", "description": "Raw text to analyze" }
            },
            "required": ["content"]
        })
    }

    async fn execute(&self, call: &ToolCall, _ctx: &ToolContext) -> ToolOutput {
        let content = match call.str_arg("content") {
            Ok(c) => c,
            Err(out) => return out,
        };

        let lines = content.lines().count();
        let words = content.split_whitespace().count();
        let urls: Vec<&str> = content
            .split_whitespace()
            .filter(|w| w.starts_with("http://") || w.starts_with("https://"))
            .collect();
        let headings: Vec<&str> = content
            .lines()
            .filter(|l| l.trim_start().starts_with('#'))
            .map(str::trim)
            .collect();

        let mut report = format!(
            "lines: {lines}\nwords: {words}\nchars: {}\n",
            content.chars().count()
        );
        if !urls.is_empty() {
            report.push_str(&format!("urls ({}):\n", urls.len()));
            for u in &urls {
                report.push_str(&format!("  {u}\n"));
            }
        }
        if !headings.is_empty() {
            report.push_str(&format!("headings ({}):\n", headings.len()));
            for h in &headings {
                report.push_str(&format!("  {h}\n"));
            }
        }
        ToolOutput::ok(&call.id, report)
    }
}
