// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use skriv_events::KbChange;
use skriv_model::{ChatMessage, ChatRequest, ModelProvider, ToolSchema};
use skriv_tools::ToolSchema as RegistrySchema;

use crate::agent::AgentTask;
use crate::prompts;

/// What the agent decided to do in one iteration.
#[derive(Debug)]
pub enum AgentDecision {
    /// The task is finished
    End(AgentResult),
    /// Invoke a tool and feed its result back into history
    ToolCall { name: String, args: Value },
    /// Record intermediate reasoning (e.g. the initial plan) and continue
    Continue { thought: String },
}

/// Terminal payload of a task.
#[derive(Debug, Clone, Default)]
pub struct AgentResult {
    /// Markdown note, answer text, or change summary depending on mode
    pub answer: String,
    /// File changes reported by a strategy that performed them outside the
    /// registry (the external driver).  Registry-tracked changes live in
    /// the task's [`skriv_tools::KbChangesTracker`] instead.
    pub external_changes: Vec<KbChange>,
}

/// One entry of the agent's working history.
#[derive(Debug, Clone)]
pub enum HistoryEntry {
    Thought(String),
    ToolExchange {
        name: String,
        args: Value,
        output: String,
        is_error: bool,
    },
}

/// The decision port.  Implementations own the "think" half of the loop;
/// the [`crate::Agent`] owns the "act" half.
#[async_trait]
pub trait DecisionStrategy: Send + Sync {
    async fn decide(
        &self,
        task: &AgentTask,
        history: &[HistoryEntry],
        tools: &[RegistrySchema],
    ) -> anyhow::Result<AgentDecision>;
}

// ─── Autonomous model-driven strategy ────────────────────────────────────────

/// Plans on iteration 0, then walks the plan with tool calls until the
/// model answers in plain text.
pub struct ModelStrategy {
    provider: Arc<dyn ModelProvider>,
    temperature: Option<f32>,
}

impl ModelStrategy {
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self {
            provider,
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    fn render_messages(&self, task: &AgentTask, history: &[HistoryEntry]) -> Vec<ChatMessage> {
        let mut messages = vec![
            ChatMessage::system(prompts::system_prompt(task.mode)),
            ChatMessage::user(&task.input),
        ];
        for (i, entry) in history.iter().enumerate() {
            match entry {
                HistoryEntry::Thought(t) => messages.push(ChatMessage::assistant(t)),
                HistoryEntry::ToolExchange {
                    name,
                    args,
                    output,
                    is_error,
                } => {
                    let call_id = format!("call_{i}");
                    messages.push(ChatMessage::assistant(format!(
                        "[tool_call id={call_id}] {name} {args}"
                    )));
                    let prefix = if *is_error { "[tool error] " } else { "" };
                    messages.push(ChatMessage::tool_result(
                        call_id,
                        format!("{prefix}{output}"),
                    ));
                }
            }
        }
        messages
    }
}

#[async_trait]
impl DecisionStrategy for ModelStrategy {
    async fn decide(
        &self,
        task: &AgentTask,
        history: &[HistoryEntry],
        tools: &[RegistrySchema],
    ) -> anyhow::Result<AgentDecision> {
        // Iteration 0: produce a plan with no tools offered, so the model
        // commits to an approach before acting.
        if history.is_empty() {
            let mut messages = self.render_messages(task, history);
            messages.push(ChatMessage::user(
                "Before doing anything, write a short numbered plan for this task. \
                 Reply with the plan only.",
            ));
            let resp = self
                .provider
                .chat(ChatRequest {
                    messages,
                    tools: Vec::new(),
                    temperature: self.temperature,
                })
                .await?;
            let plan = resp.content.unwrap_or_default();
            debug!(task_id = %task.task_id, "plan produced");
            return Ok(AgentDecision::Continue { thought: plan });
        }

        let schemas: Vec<ToolSchema> = tools
            .iter()
            .map(|t| ToolSchema {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.clone(),
            })
            .collect();

        let resp = self
            .provider
            .chat(ChatRequest {
                messages: self.render_messages(task, history),
                tools: schemas,
                temperature: self.temperature,
            })
            .await?;

        if let Some(call) = resp.tool_calls.into_iter().next() {
            return Ok(AgentDecision::ToolCall {
                name: call.name,
                args: call.arguments,
            });
        }
        match resp.content {
            Some(content) if !content.trim().is_empty() => Ok(AgentDecision::End(AgentResult {
                answer: content,
                external_changes: Vec::new(),
            })),
            // An empty turn carries no signal; record it and move on so the
            // iteration cap, not an error, bounds a silent model.
            _ => Ok(AgentDecision::Continue {
                thought: String::new(),
            }),
        }
    }
}

// ─── Autonomous-external strategy ────────────────────────────────────────────

/// Output contract of the external CLI driver: one JSON object on stdout.
#[derive(Debug, Deserialize)]
struct DriverReport {
    summary: String,
    #[serde(default)]
    changes: Vec<KbChange>,
}

/// Delegates the whole loop to an external CLI driver.  The driver gets
/// the task input on stdin and the KB root in `SKRIV_KB_ROOT`; it performs
/// its own plan/act cycle and reports a summary plus the files it touched.
pub struct ExternalStrategy {
    command: String,
}

impl ExternalStrategy {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl DecisionStrategy for ExternalStrategy {
    async fn decide(
        &self,
        task: &AgentTask,
        _history: &[HistoryEntry],
        _tools: &[RegistrySchema],
    ) -> anyhow::Result<AgentDecision> {
        use tokio::io::AsyncWriteExt;

        debug!(task_id = %task.task_id, command = %self.command, "running external driver");
        let mut child = tokio::process::Command::new("bash")
            .arg("-c")
            .arg(&self.command)
            .env("SKRIV_KB_ROOT", &task.kb_root)
            .env("SKRIV_USER_ID", task.user_id.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(task.input.as_bytes()).await?;
            stdin.shutdown().await?;
        }
        let out = child.wait_with_output().await?;
        if !out.status.success() {
            anyhow::bail!(
                "external driver failed ({}): {}",
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            );
        }

        let report: DriverReport = serde_json::from_slice(&out.stdout)
            .map_err(|e| anyhow::anyhow!("external driver produced invalid report: {e}"))?;
        Ok(AgentDecision::End(AgentResult {
            answer: report.summary,
            external_changes: report.changes,
        }))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
