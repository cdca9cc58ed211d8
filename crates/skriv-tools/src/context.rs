// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};
use std::sync::Arc;

use skriv_events::{Event, EventBus, KbChange, KbChangeKind};

use crate::changes::KbChangesTracker;
use crate::sandbox::{resolve_sandboxed, SandboxError};

/// Per-task execution context handed to every tool invocation.
///
/// Carries the identity scope (user, KB, task), the sandbox policy, the
/// event publisher port and the change tracker.  Tools never reach for
/// globals — everything they may touch flows through here.
#[derive(Clone)]
pub struct ToolContext {
    pub user_id: i64,
    pub kb_id: String,
    pub kb_root: PathBuf,
    /// Restrict path resolution to `<kb_root>/topics`
    pub topics_only: bool,
    pub task_id: String,
    bus: Arc<EventBus>,
    changes: Arc<KbChangesTracker>,
}

impl ToolContext {
    pub fn new(
        user_id: i64,
        kb_id: impl Into<String>,
        kb_root: impl Into<PathBuf>,
        topics_only: bool,
        task_id: impl Into<String>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            user_id,
            kb_id: kb_id.into(),
            kb_root: kb_root.into(),
            topics_only,
            task_id: task_id.into(),
            bus,
            changes: Arc::new(KbChangesTracker::new()),
        }
    }

    /// Resolve a tool path argument through the sandbox.
    pub fn resolve(&self, raw: &str) -> Result<PathBuf, SandboxError> {
        resolve_sandboxed(&self.kb_root, self.topics_only, raw)
    }

    /// Resolve with the topics restriction lifted, for read-only tools that
    /// may look at `index.md` and other root-level files.
    pub fn resolve_for_read(&self, raw: &str) -> Result<PathBuf, SandboxError> {
        resolve_sandboxed(&self.kb_root, false, raw)
    }

    /// Record a successful mutation and publish the matching event.
    ///
    /// `path` is absolute (as returned by [`Self::resolve`]); it is stored
    /// KB-relative so summaries and events are stable across hosts.
    pub fn record_change(&self, kind: KbChangeKind, path: &Path, source: &str) {
        self.record_change_inner(kind, path, None, source);
    }

    pub fn record_move(&self, kind: KbChangeKind, from: &Path, to: &Path, source: &str) {
        self.record_change_inner(kind, from, Some(to), source);
    }

    fn record_change_inner(
        &self,
        kind: KbChangeKind,
        path: &Path,
        moved_to: Option<&Path>,
        source: &str,
    ) {
        let rel = self.relative(path);
        let change = match moved_to {
            Some(to) => KbChange::moved(kind, rel, self.relative(to)),
            None => KbChange::new(kind, rel),
        };
        self.changes.record(change.clone());
        self.bus.publish(&Event::KbChanged {
            user_id: self.user_id,
            kb_id: self.kb_id.clone(),
            change,
            source: source.to_string(),
        });
    }

    /// Publish a non-change event (agent lifecycle, tool telemetry).
    pub fn publish(&self, event: &Event) {
        self.bus.publish(event);
    }

    pub fn changes(&self) -> &KbChangesTracker {
        &self.changes
    }

    fn relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.kb_root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
