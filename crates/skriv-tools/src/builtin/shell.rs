// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::process::Stdio;

use async_trait::async_trait;
#[cfg(unix)]
use libc;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::debug;

use skriv_config::Mode;

use crate::context::ToolContext;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Hard byte ceiling for combined stdout + stderr returned to the model.
const OUTPUT_LIMIT_BYTES: usize = 20_000;

/// Lines preserved from each end when output exceeds the ceiling.  Errors
/// and summaries cluster at the end of command output, so the tail matters
/// as much as the head.
const HEAD_LINES: usize = 60;
const TAIL_LINES: usize = 40;

/// Runs a shell command inside the KB working tree.
///
/// Registered only when `tools.enable_shell` is set.  The working directory
/// always resolves through the sandbox: commands run under the KB root (or
/// `topics/` when the policy demands it), never elsewhere.
pub struct ShellTool {
    pub timeout_secs: u64,
}

impl Default for ShellTool {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command inside the knowledge base and return stdout + \
         stderr. 'workdir' is KB-relative (default: KB root). Output is capped \
         at ~20 KB; oversized output keeps the first 60 and last 40 lines. \
         Prefer the kb_* and file_* tools for note operations — shell is for \
         everything they cannot do."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The bash one-liner to execute"
                },
                "workdir": {
                    "type": "string",
                    "description": "KB-relative working directory (optional)"
                },
                "timeout_secs": {
                    "type": "integer",
                    "description": "Execution timeout in seconds (optional)"
                }
            },
            "required": ["command"]
        })
    }

    fn modes(&self) -> &[Mode] {
        &[Mode::Agent]
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> ToolOutput {
        let command = match call.str_arg("command") {
            Ok(c) => c.to_string(),
            Err(out) => return out,
        };
        let workdir = match call.args.get("workdir").and_then(|v| v.as_str()) {
            Some(raw) => match ctx.resolve(raw) {
                Ok(p) => p,
                Err(e) => return ToolOutput::err(&call.id, e.to_string()),
            },
            None => ctx.kb_root.clone(),
        };
        let timeout = call
            .args
            .get("timeout_secs")
            .and_then(|v| v.as_u64())
            .unwrap_or(self.timeout_secs);

        debug!(cmd = %command, workdir = %workdir.display(), "shell tool");

        let mut cmd = Command::new("bash");
        cmd.arg("-c").arg(&command);
        cmd.current_dir(&workdir);
        // No terminal access: stdin from /dev/null and a fresh session so
        // the child cannot open /dev/tty behind our back.
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }

        let output = tokio::time::timeout(
            std::time::Duration::from_secs(timeout),
            cmd.output(),
        )
        .await;

        match output {
            Err(_) => ToolOutput::err(&call.id, format!("command timed out after {timeout}s")),
            Ok(Err(e)) => ToolOutput::err(&call.id, format!("spawn failed: {e}")),
            Ok(Ok(out)) => {
                let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
                let stderr = String::from_utf8_lossy(&out.stderr);
                if !stderr.trim().is_empty() {
                    text.push_str("\n--- stderr ---\n");
                    text.push_str(&stderr);
                }
                let text = cap_output(&text);
                if out.status.success() {
                    ToolOutput::ok(&call.id, text)
                } else {
                    ToolOutput::err(
                        &call.id,
                        format!("exit status {}\n{text}", out.status),
                    )
                }
            }
        }
    }
}

/// Keep the head and tail of oversized output with an omission marker.
fn cap_output(text: &str) -> String {
    if text.len() <= OUTPUT_LIMIT_BYTES {
        return text.to_string();
    }
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() <= HEAD_LINES + TAIL_LINES {
        // Few but huge lines; hard cut.
        let mut cut = text.chars().take(OUTPUT_LIMIT_BYTES).collect::<String>();
        cut.push_str("\n[... output truncated ...]");
        return cut;
    }
    let head = lines[..HEAD_LINES].join("\n");
    let tail = lines[lines.len() - TAIL_LINES..].join("\n");
    format!(
        "{head}\n[... {} lines omitted ...]\n{tail}",
        lines.len() - HEAD_LINES - TAIL_LINES
    )
}
