// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use skriv_chat::{Outbound, SendOptions};
use skriv_config::{AgentConfig, Mode};
use skriv_events::{EventBus, KbChange};
use skriv_kb::{
    note_relative_path, parse_metadata_block, GitSync, KbDescriptor, KbLockManager, KbRegistry,
    NoteMetadata, ProcessingRecord, ProcessingTracker,
};
use skriv_tools::{ToolCall, ToolContext};
use uuid::Uuid;

use crate::agent::{Agent, AgentTask};
use crate::group::MessageGroup;
use crate::prompts;
use crate::users::UserContexts;

/// Routes each closed [`MessageGroup`] into its user's current mode and
/// supervises the resulting task.
///
/// Per-(user, kb) mutual exclusion: each pair has a fair async mutex, so a
/// group arriving while a task runs queues FIFO behind it.  User-visible
/// progress goes through the outbound adapter: one "working" message that
/// is edited in place to the final state, and exactly one error message on
/// failure.
pub struct Router {
    users: Arc<UserContexts>,
    kbs: Arc<KbRegistry>,
    locks: Arc<KbLockManager>,
    tracker: Arc<ProcessingTracker>,
    git: Arc<GitSync>,
    bus: Arc<EventBus>,
    outbound: Arc<Outbound>,
    agent: Arc<Agent>,
    agent_cfg: AgentConfig,
    topics_only: bool,
    task_slots: StdMutex<HashMap<(i64, String), Arc<Mutex<()>>>>,
}

impl Router {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        users: Arc<UserContexts>,
        kbs: Arc<KbRegistry>,
        locks: Arc<KbLockManager>,
        tracker: Arc<ProcessingTracker>,
        git: Arc<GitSync>,
        bus: Arc<EventBus>,
        outbound: Arc<Outbound>,
        agent: Arc<Agent>,
        agent_cfg: AgentConfig,
        topics_only: bool,
    ) -> Self {
        Self {
            users,
            kbs,
            locks,
            tracker,
            git,
            bus,
            outbound,
            agent,
            agent_cfg,
            topics_only,
            task_slots: StdMutex::new(HashMap::new()),
        }
    }

    fn task_slot(&self, user_id: i64, kb_id: &str) -> Arc<Mutex<()>> {
        let mut slots = self.task_slots.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            slots
                .entry((user_id, kb_id.to_string()))
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Entry point: one closed group in, one supervised task out.
    pub async fn route(&self, group: MessageGroup) {
        let user_id = group.user_id;
        let chat_id = group.chat_id;

        let mode = self.users.mode(user_id).await;
        let kb = match self.kbs.get_or_create(user_id) {
            Ok(kb) => kb,
            Err(e) => {
                warn!(user_id, error = %e, "no KB for user");
                self.say(chat_id, "Your knowledge base is unavailable right now.")
                    .await;
                return;
            }
        };

        // One active task per (user, kb); later groups wait their turn in
        // arrival order.
        let slot = self.task_slot(user_id, &kb.kb_id);
        let _task_guard = slot.lock().await;

        let task = AgentTask {
            task_id: Uuid::new_v4().to_string(),
            user_id,
            kb_id: kb.kb_id.clone(),
            kb_root: kb.root_path.clone(),
            mode,
            input: prompts::task_input(mode, &group.combined_text()),
            max_iterations: self.agent_cfg.max_iterations,
            timeout: Duration::from_secs(self.agent_cfg.timeout_secs),
        };
        let ctx = ToolContext::new(
            user_id,
            kb.kb_id.clone(),
            kb.root_path.clone(),
            self.topics_only,
            task.task_id.clone(),
            Arc::clone(&self.bus),
        );
        info!(user_id, task_id = %task.task_id, %mode, group_id = %group.group_id, "routing group");

        match mode {
            Mode::Note => self.note_flow(&group, &kb, task, ctx).await,
            Mode::Ask => self.ask_flow(chat_id, task, ctx).await,
            Mode::Agent => self.agent_flow(chat_id, &kb, task, ctx).await,
        }
    }

    // ── note ─────────────────────────────────────────────────────────────────

    async fn note_flow(
        &self,
        group: &MessageGroup,
        kb: &KbDescriptor,
        task: AgentTask,
        ctx: ToolContext,
    ) {
        let chat_id = group.chat_id;
        let hash = group.content_hash();

        if self.tracker.is_processed(&hash) {
            debug!(user_id = group.user_id, %hash, "duplicate content");
            let existing = self.tracker.get(&hash).and_then(|r| r.kb_file);
            let text = match existing {
                Some(path) => format!("Already in your knowledge base: {path}"),
                None => "Already in your knowledge base.".to_string(),
            };
            self.say(chat_id, &text).await;
            return;
        }

        let progress = self.say(chat_id, "Working on your note…").await;

        match self.agent.run(&task, &ctx).await {
            Ok(outcome) => {
                match self
                    .write_note(&task, kb, &ctx, &hash, &outcome.result.answer)
                    .await
                {
                    Ok(rel_path) => {
                        self.finish(chat_id, progress, &format!("Done: {rel_path}"))
                            .await;
                    }
                    Err(e) => {
                        warn!(task_id = %task.task_id, error = %e, "note write failed");
                        self.record_failure(&hash, task.user_id).await;
                        self.finish(chat_id, progress, "Something went wrong while saving your note.")
                            .await;
                    }
                }
            }
            Err(e) => {
                warn!(task_id = %task.task_id, error = %e, "note agent failed");
                self.record_failure(&hash, task.user_id).await;
                self.finish(chat_id, progress, "Something went wrong while writing your note.")
                    .await;
            }
        }
    }

    /// Place the note under the KB lock: file write through the registry,
    /// tracker record, then git sync — in that order, all inside the
    /// critical section.
    async fn write_note(
        &self,
        task: &AgentTask,
        kb: &KbDescriptor,
        ctx: &ToolContext,
        hash: &str,
        answer: &str,
    ) -> anyhow::Result<String> {
        let meta = parse_metadata_block(answer).unwrap_or_else(NoteMetadata::default);
        let title = note_title(answer);
        let rel = note_relative_path(&meta, &title, Utc::now().date_naive());
        let rel_str = rel.display().to_string();

        let _kb_guard = self
            .locks
            .lock(&kb.kb_id, &kb.root_path, "note write")
            .await
            .context("acquiring KB lock")?;

        let call = ToolCall::new(
            format!("{}_write", task.task_id),
            "file_create",
            json!({ "path": rel_str, "content": answer }),
        );
        let out = self.agent.registry().execute(&call, ctx).await;
        if out.is_error {
            anyhow::bail!("file_create failed: {}", out.content);
        }

        self.tracker
            .record(ProcessingRecord::completed(
                hash,
                task.user_id,
                Some(rel_str.clone()),
            ))
            .await
            .context("recording processed content")?;

        if let Err(e) = self
            .git
            .commit_and_push(kb, task.user_id, &format!("Add note: {title}"))
            .await
        {
            // The note is on disk and tracked; a sync hiccup repairs itself
            // on the next successful task.
            warn!(kb_id = %kb.kb_id, error = %e, "git sync failed after note write");
        }

        Ok(rel_str)
    }

    async fn record_failure(&self, hash: &str, user_id: i64) {
        if let Err(e) = self
            .tracker
            .record(ProcessingRecord::failed(hash, user_id))
            .await
        {
            warn!(error = %e, "could not record failed processing");
        }
    }

    // ── ask ──────────────────────────────────────────────────────────────────

    async fn ask_flow(&self, chat_id: i64, task: AgentTask, ctx: ToolContext) {
        let progress = self.say(chat_id, "Looking through your knowledge base…").await;
        match self.agent.run(&task, &ctx).await {
            Ok(outcome) => {
                let answer = if outcome.result.answer.trim().is_empty() {
                    "I found nothing relevant in your knowledge base.".to_string()
                } else {
                    outcome.result.answer
                };
                self.finish(chat_id, progress, &answer).await;
            }
            Err(e) => {
                warn!(task_id = %task.task_id, error = %e, "ask agent failed");
                self.finish(chat_id, progress, "I couldn't answer that right now.")
                    .await;
            }
        }
    }

    // ── agent ────────────────────────────────────────────────────────────────

    async fn agent_flow(
        &self,
        chat_id: i64,
        kb: &KbDescriptor,
        task: AgentTask,
        ctx: ToolContext,
    ) {
        let progress = self.say(chat_id, "Working…").await;

        // Full-privilege tasks mutate through their tools, so the critical
        // section spans the whole run plus the git sync.
        let run = async {
            let _kb_guard = self
                .locks
                .lock(&kb.kb_id, &kb.root_path, "agent task")
                .await
                .context("acquiring KB lock")?;
            let outcome = self.agent.run(&task, &ctx).await?;
            if !outcome.changes.is_empty() {
                if let Err(e) = self
                    .git
                    .commit_and_push(kb, task.user_id, "Agent task changes")
                    .await
                {
                    warn!(kb_id = %kb.kb_id, error = %e, "git sync failed after agent task");
                }
            }
            Ok::<_, anyhow::Error>(outcome)
        };

        match run.await {
            Ok(outcome) => {
                let mut summary = outcome.result.answer.trim().to_string();
                if summary.is_empty() {
                    summary = "Task finished.".to_string();
                }
                if !outcome.changes.is_empty() {
                    summary.push_str("\n\nChanges:\n");
                    summary.push_str(&render_changes(&outcome.changes));
                }
                self.finish(chat_id, progress, &summary).await;
            }
            Err(e) => {
                warn!(task_id = %task.task_id, error = %e, "agent task failed");
                self.finish(chat_id, progress, "The task failed.").await;
            }
        }
    }

    // ── progress messaging ───────────────────────────────────────────────────

    /// Send a message, tolerating delivery failure (the outbound adapter
    /// already retried transient errors).
    async fn say(&self, chat_id: i64, text: &str) -> Option<skriv_chat::MessageHandle> {
        match self
            .outbound
            .send_message(chat_id, text, &SendOptions::default())
            .await
        {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(chat_id, error = %e, "progress message delivery failed");
                None
            }
        }
    }

    /// Replace the progress message with the final state, falling back to
    /// a fresh message when there is nothing to edit.
    async fn finish(
        &self,
        chat_id: i64,
        progress: Option<skriv_chat::MessageHandle>,
        text: &str,
    ) {
        let result = match &progress {
            Some(handle) => self
                .outbound
                .edit_message(handle, text, &SendOptions::default())
                .await,
            None => self
                .outbound
                .send_message(chat_id, text, &SendOptions::default())
                .await
                .map(|_| ()),
        };
        if let Err(e) = result {
            warn!(chat_id, error = %e, "final message delivery failed");
        }
    }
}

/// Title of a note: the first `# ` heading, else the first non-empty line.
fn note_title(markdown: &str) -> String {
    for line in markdown.lines() {
        if let Some(h) = line.strip_prefix("# ") {
            return h.trim().to_string();
        }
    }
    markdown
        .lines()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("note")
        .chars()
        .take(60)
        .collect::<String>()
        .trim()
        .to_string()
}

fn render_changes(changes: &[KbChange]) -> String {
    use skriv_events::KbChangeKind::*;
    let mut out = String::new();
    for c in changes {
        let verb = match c.kind {
            FileCreated => "created",
            FileModified => "modified",
            FileDeleted => "deleted",
            FolderCreated => "created folder",
            FolderDeleted => "deleted folder",
            FolderMoved => "moved folder",
        };
        match &c.moved_to {
            Some(to) => out.push_str(&format!("- {verb} {} → {}\n", c.path.display(), to.display())),
            None => out.push_str(&format!("- {verb} {}\n", c.path.display())),
        }
    }
    out
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
