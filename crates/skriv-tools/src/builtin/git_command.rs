// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::debug;

use skriv_config::Mode;

use crate::context::ToolContext;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Read-only git subcommands the agent may run.  Mutations (commit, push)
/// happen in the router's sync step, never from inside a task.
const ALLOWED: &[&str] = &["status", "log", "diff", "show", "branch", "shortlog"];

pub struct GitCommandTool;

#[async_trait]
impl Tool for GitCommandTool {
    fn name(&self) -> &str {
        "git_command"
    }

    fn description(&self) -> &str {
        "Run a read-only git command in the knowledge-base repository. Allowed \
         subcommands: status, log, diff, show, branch, shortlog. Pass the \
         subcommand and its arguments as 'args', e.g. [\"log\", \"--oneline\", \"-5\"]."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "args": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "git subcommand and arguments"
                }
            },
            "required": ["args"]
        })
    }

    fn modes(&self) -> &[Mode] {
        &[Mode::Ask, Mode::Agent]
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> ToolOutput {
        let args: Vec<String> = match call
            .args
            .get("args")
            .map(|v| serde_json::from_value(v.clone()))
        {
            Some(Ok(a)) => a,
            _ => return ToolOutput::err(&call.id, "missing required parameter 'args'"),
        };
        let Some(sub) = args.first() else {
            return ToolOutput::err(&call.id, "'args' must not be empty");
        };
        if !ALLOWED.contains(&sub.as_str()) {
            return ToolOutput::err(
                &call.id,
                format!("git subcommand '{sub}' is not allowed here (read-only: {ALLOWED:?})"),
            );
        }

        debug!(?args, "git_command");
        let out = match Command::new("git")
            .args(&args)
            .current_dir(&ctx.kb_root)
            .stdin(Stdio::null())
            .output()
            .await
        {
            Ok(out) => out,
            Err(e) => return ToolOutput::err(&call.id, format!("spawning git failed: {e}")),
        };

        let stdout = String::from_utf8_lossy(&out.stdout);
        let stderr = String::from_utf8_lossy(&out.stderr);
        if out.status.success() {
            ToolOutput::ok(&call.id, stdout.into_owned())
        } else {
            ToolOutput::err(&call.id, format!("git {sub} failed: {}", stderr.trim()))
        }
    }
}
