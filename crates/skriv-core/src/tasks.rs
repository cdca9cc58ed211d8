// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Descriptive metadata stored with every registered task.
#[derive(Debug, Clone)]
pub struct TaskMetadata {
    pub description: String,
    pub user_id: Option<i64>,
}

impl TaskMetadata {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            user_id: None,
        }
    }

    pub fn for_user(description: impl Into<String>, user_id: i64) -> Self {
        Self {
            description: description.into(),
            user_id: Some(user_id),
        }
    }
}

struct TaskEntry {
    seq: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    meta: TaskMetadata,
    started_at: DateTime<Utc>,
}

/// Central lifecycle owner for background work.
///
/// Components never spawn user-scoped workers directly; they register them
/// here under a stable id (`aggregator_user_<id>`, `indexer`, …) so the
/// application can enumerate, cancel and drain everything on shutdown.
/// Registering an id that is already live cancels and awaits the previous
/// task first.  Finished tasks remove themselves; the manager never
/// restarts anything — supervision is a higher layer's call.
pub struct TaskManager {
    tasks: Arc<Mutex<HashMap<String, TaskEntry>>>,
    next_seq: AtomicU64,
    grace: Duration,
}

impl TaskManager {
    pub fn new(grace: Duration) -> Self {
        Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            next_seq: AtomicU64::new(1),
            grace,
        }
    }

    /// Start `make(cancel_token)` as a tracked task under `task_id`.
    pub async fn register<F, Fut>(&self, task_id: &str, meta: TaskMetadata, make: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        // Replace-by-id: the old task is cancelled and awaited before the
        // new one starts, so two workers never share an id.
        if let Some(old) = self.tasks.lock().await.remove(task_id) {
            debug!(task_id, "replacing existing task");
            self.shutdown_entry(task_id, old).await;
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let fut = make(cancel.clone());

        let tasks = Arc::clone(&self.tasks);
        let id_owned = task_id.to_string();
        let meta_clone = meta.clone();
        let handle = tokio::spawn(async move {
            match fut.await {
                Ok(()) => debug!(task_id = %id_owned, "task completed"),
                Err(e) => warn!(
                    task_id = %id_owned,
                    description = %meta_clone.description,
                    user_id = ?meta_clone.user_id,
                    error = %e,
                    "task failed"
                ),
            }
            // Self-removal; the seq guard keeps a replacement entry alive.
            let mut map = tasks.lock().await;
            if map.get(&id_owned).map(|e| e.seq) == Some(seq) {
                map.remove(&id_owned);
            }
        });

        self.tasks.lock().await.insert(
            task_id.to_string(),
            TaskEntry {
                seq,
                cancel,
                handle,
                meta,
                started_at: Utc::now(),
            },
        );
    }

    /// Cooperatively cancel a task and await it, hard-aborting after the
    /// grace period.  Unknown ids are a no-op.
    pub async fn unregister(&self, task_id: &str) {
        let entry = self.tasks.lock().await.remove(task_id);
        if let Some(entry) = entry {
            self.shutdown_entry(task_id, entry).await;
        }
    }

    async fn shutdown_entry(&self, task_id: &str, mut entry: TaskEntry) {
        entry.cancel.cancel();
        match tokio::time::timeout(self.grace, &mut entry.handle).await {
            Ok(_) => debug!(task_id, "task stopped"),
            Err(_) => {
                warn!(
                    task_id,
                    grace_ms = self.grace.as_millis() as u64,
                    "task ignored cancellation; aborting"
                );
                entry.handle.abort();
                let _ = entry.handle.await;
            }
        }
    }

    /// Cancel every task and await completion.
    pub async fn stop(&self) {
        let entries: Vec<(String, TaskEntry)> = self.tasks.lock().await.drain().collect();
        for (_, entry) in &entries {
            entry.cancel.cancel();
        }
        for (task_id, mut entry) in entries {
            match tokio::time::timeout(self.grace, &mut entry.handle).await {
                Ok(_) => debug!(task_id = %task_id, "task drained"),
                Err(_) => {
                    warn!(task_id = %task_id, "task did not stop within grace period; aborting");
                    entry.handle.abort();
                    let _ = entry.handle.await;
                }
            }
        }
    }

    pub async fn contains(&self, task_id: &str) -> bool {
        self.tasks.lock().await.contains_key(task_id)
    }

    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.lock().await.is_empty()
    }

    /// Snapshot of (task_id, description, user_id, started_at) for status
    /// surfaces.
    pub async fn list(&self) -> Vec<(String, String, Option<i64>, DateTime<Utc>)> {
        self.tasks
            .lock()
            .await
            .iter()
            .map(|(id, e)| {
                (
                    id.clone(),
                    e.meta.description.clone(),
                    e.meta.user_id,
                    e.started_at,
                )
            })
            .collect()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
