// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::Value;

use skriv_config::Mode;

use crate::context::ToolContext;

/// A single tool invocation requested by the agent.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Opaque identifier assigned by the caller (forwarded verbatim)
    pub id: String,
    pub name: String,
    /// Parsed JSON arguments
    pub args: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }

    /// Fetch a required string argument, or a ready-made error output.
    pub fn str_arg(&self, key: &str) -> Result<&str, ToolOutput> {
        match self.args.get(key).and_then(|v| v.as_str()) {
            Some(s) => Ok(s),
            None => {
                let preview =
                    serde_json::to_string(&self.args).unwrap_or_else(|_| "null".to_string());
                Err(ToolOutput::err(
                    &self.id,
                    format!("missing required parameter '{key}'. Received: {preview}"),
                ))
            }
        }
    }
}

/// The result of executing a tool.  Tool-level failures are expressed as
/// `is_error = true` rather than as Rust errors, so the agent loop can feed
/// them back into history and let the model recover.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub call_id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn err(call_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: msg.into(),
            is_error: true,
        }
    }
}

/// Trait that every built-in and MCP-wrapped tool implements.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for parameters
    fn parameters_schema(&self) -> Value;
    /// The processing modes in which this tool is offered to the model.
    /// Default: all modes.  Mutating tools restrict themselves to `Agent`;
    /// the router may still invoke them directly regardless of mode.
    fn modes(&self) -> &[Mode] {
        &[Mode::Note, Mode::Ask, Mode::Agent]
    }
    /// Execute the tool.  Failures are wrapped in [`ToolOutput::err`].
    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> ToolOutput;
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
