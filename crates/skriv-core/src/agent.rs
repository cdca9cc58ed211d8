// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, warn};

use skriv_config::Mode;
use skriv_events::{Event, KbChange};
use skriv_model::retry_with_backoff;
use skriv_tools::{ToolCall, ToolContext, ToolRegistry};

use crate::decision::{AgentDecision, AgentResult, DecisionStrategy, HistoryEntry};

/// One unit of agent work, created by the router.
#[derive(Debug, Clone)]
pub struct AgentTask {
    pub task_id: String,
    pub user_id: i64,
    pub kb_id: String,
    pub kb_root: PathBuf,
    pub mode: Mode,
    pub input: String,
    pub max_iterations: u32,
    pub timeout: Duration,
}

/// What a finished task hands back to the router.
#[derive(Debug)]
pub struct AgentOutcome {
    pub result: AgentResult,
    pub iterations: u32,
    /// Union of registry-tracked and externally-reported changes
    pub changes: Vec<KbChange>,
}

/// The bounded plan/act/observe loop.
///
/// Each iteration asks the strategy for a decision and acts on it.  Tool
/// failures are history entries, not task failures; provider failures are
/// retried with backoff and only their exhaustion is terminal.  The task
/// deadline bounds the whole run, and dropping the returned future cancels
/// any in-flight tool invocation with it.
pub struct Agent {
    strategy: Arc<dyn DecisionStrategy>,
    registry: Arc<ToolRegistry>,
    provider_retries: u32,
    provider_backoff: Duration,
}

impl Agent {
    pub fn new(
        strategy: Arc<dyn DecisionStrategy>,
        registry: Arc<ToolRegistry>,
        provider_retries: u32,
        provider_backoff: Duration,
    ) -> Self {
        Self {
            strategy,
            registry,
            provider_retries,
            provider_backoff,
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Run the task to completion, the iteration cap, or the deadline.
    pub async fn run(&self, task: &AgentTask, ctx: &ToolContext) -> anyhow::Result<AgentOutcome> {
        ctx.publish(&Event::AgentStarted {
            user_id: task.user_id,
            task_id: task.task_id.clone(),
            mode: task.mode.to_string(),
        });

        let outcome = match tokio::time::timeout(task.timeout, self.run_inner(task, ctx)).await {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!(
                "task deadline of {:?} exceeded",
                task.timeout
            )),
        };

        ctx.publish(&Event::AgentFinished {
            user_id: task.user_id,
            task_id: task.task_id.clone(),
            success: outcome.is_ok(),
            iterations: outcome.as_ref().map(|o| o.iterations).unwrap_or(0),
        });
        outcome
    }

    async fn run_inner(&self, task: &AgentTask, ctx: &ToolContext) -> anyhow::Result<AgentOutcome> {
        let mut history: Vec<HistoryEntry> = Vec::new();
        let schemas = self.registry.schemas_for_mode(task.mode);

        for iteration in 0..task.max_iterations {
            let decision = retry_with_backoff(
                "agent decision",
                self.provider_retries,
                self.provider_backoff,
                || self.strategy.decide(task, &history, &schemas),
            )
            .await
            .context("decision provider failed")?;

            match decision {
                AgentDecision::End(result) => {
                    debug!(task_id = %task.task_id, iteration, "task finished");
                    let mut changes = ctx.changes().snapshot();
                    changes.extend(result.external_changes.iter().cloned());
                    return Ok(AgentOutcome {
                        result,
                        iterations: iteration + 1,
                        changes,
                    });
                }
                AgentDecision::ToolCall { name, args } => {
                    if self.registry.get(&name).is_none() {
                        // A hallucinated tool name is unrecoverable: the
                        // schema list was already in the prompt.
                        anyhow::bail!("agent requested unknown tool '{name}'");
                    }
                    let call = ToolCall::new(format!("call_{iteration}"), name.clone(), args.clone());
                    debug!(task_id = %task.task_id, iteration, tool = %name, "executing tool");
                    // Model-issued calls go through the registry's mode
                    // policy: a tool outside the task's mode (a write in
                    // ask mode) is denied and the denial lands in history.
                    let output = self.registry.execute_for_mode(&call, task.mode, ctx).await;
                    if output.is_error {
                        warn!(task_id = %task.task_id, tool = %name, "tool failed: {}", output.content);
                    }
                    ctx.publish(&Event::ToolCalled {
                        user_id: task.user_id,
                        task_id: task.task_id.clone(),
                        tool: name.clone(),
                        success: !output.is_error,
                    });
                    history.push(HistoryEntry::ToolExchange {
                        name,
                        args,
                        output: output.content,
                        is_error: output.is_error,
                    });
                }
                AgentDecision::Continue { thought } => {
                    history.push(HistoryEntry::Thought(thought));
                }
            }
        }

        anyhow::bail!(
            "iteration limit of {} reached without a final answer",
            task.max_iterations
        )
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
