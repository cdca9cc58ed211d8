// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The kind of a single knowledge-base mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KbChangeKind {
    FileCreated,
    FileModified,
    FileDeleted,
    FolderCreated,
    FolderDeleted,
    FolderMoved,
}

/// One successful mutation of a KB working tree, as recorded by the change
/// tracker and mirrored on the event bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KbChange {
    pub kind: KbChangeKind,
    /// Path relative to the KB root
    pub path: PathBuf,
    /// Destination for moves; `None` otherwise
    pub moved_to: Option<PathBuf>,
}

impl KbChange {
    pub fn new(kind: KbChangeKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            moved_to: None,
        }
    }

    pub fn moved(kind: KbChangeKind, from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: from.into(),
            moved_to: Some(to.into()),
        }
    }
}

/// Subscription key.  Every [`Event`] maps to exactly one topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    FileCreated,
    FileModified,
    FileDeleted,
    FolderCreated,
    FolderDeleted,
    FolderMoved,
    GitCommit,
    GitPull,
    GitPush,
    AgentStarted,
    AgentFinished,
    ToolCalled,
}

/// Events published on the bus.  No persistence, no replay; subscribers see
/// events from a single publisher in publish order.
#[derive(Debug, Clone)]
pub enum Event {
    /// A KB working-tree mutation performed through the tool registry
    KbChanged {
        user_id: i64,
        kb_id: String,
        change: KbChange,
        /// What performed the mutation, e.g. "file_create" or "router"
        source: String,
    },
    GitCommit {
        user_id: i64,
        kb_id: String,
        message: String,
    },
    GitPull {
        user_id: i64,
        kb_id: String,
    },
    GitPush {
        user_id: i64,
        kb_id: String,
        branch: String,
    },
    AgentStarted {
        user_id: i64,
        task_id: String,
        mode: String,
    },
    AgentFinished {
        user_id: i64,
        task_id: String,
        success: bool,
        iterations: u32,
    },
    ToolCalled {
        user_id: i64,
        task_id: String,
        tool: String,
        success: bool,
    },
}

impl Event {
    pub fn topic(&self) -> Topic {
        match self {
            Event::KbChanged { change, .. } => match change.kind {
                KbChangeKind::FileCreated => Topic::FileCreated,
                KbChangeKind::FileModified => Topic::FileModified,
                KbChangeKind::FileDeleted => Topic::FileDeleted,
                KbChangeKind::FolderCreated => Topic::FolderCreated,
                KbChangeKind::FolderDeleted => Topic::FolderDeleted,
                KbChangeKind::FolderMoved => Topic::FolderMoved,
            },
            Event::GitCommit { .. } => Topic::GitCommit,
            Event::GitPull { .. } => Topic::GitPull,
            Event::GitPush { .. } => Topic::GitPush,
            Event::AgentStarted { .. } => Topic::AgentStarted,
            Event::AgentFinished { .. } => Topic::AgentFinished,
            Event::ToolCalled { .. } => Topic::ToolCalled,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
