// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tracing::debug;

use skriv_chat::IncomingMessage;

use crate::group::MessageGroup;
use crate::tasks::{TaskManager, TaskMetadata};

/// Callback receiving each closed group exactly once, in close order.
pub type GroupHandler = Arc<dyn Fn(MessageGroup) -> BoxFuture<'static, ()> + Send + Sync>;

struct AggState {
    open: Option<MessageGroup>,
    /// Bumped on every add/flush; a timer fire with a stale epoch is a
    /// no-op, which is what makes timer resets race-free.
    epoch: u64,
}

/// Per-user idle-window batcher.
///
/// `add` opens or extends the user's single open group and (re)arms the
/// idle timer through the [`TaskManager`].  On timeout or explicit `flush`
/// the group is pushed onto an internal queue drained by a tracked
/// dispatcher task, which invokes the handler sequentially — delivery is
/// exactly-once and ordered without ever blocking the caller.
pub struct Aggregator {
    user_id: i64,
    idle_timeout: Duration,
    tasks: Arc<TaskManager>,
    state: Mutex<AggState>,
    queue: mpsc::UnboundedSender<MessageGroup>,
}

impl Aggregator {
    /// Create the aggregator and start its dispatcher task
    /// (`dispatch_user_<id>`).
    pub async fn spawn(
        user_id: i64,
        idle_timeout: Duration,
        tasks: Arc<TaskManager>,
        handler: GroupHandler,
    ) -> Arc<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<MessageGroup>();
        tasks
            .register(
                &format!("dispatch_user_{user_id}"),
                TaskMetadata::for_user("group dispatcher", user_id),
                move |cancel| async move {
                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            group = rx.recv() => match group {
                                Some(group) => handler(group).await,
                                None => break,
                            }
                        }
                    }
                    Ok(())
                },
            )
            .await;

        Arc::new(Self {
            user_id,
            idle_timeout,
            tasks,
            state: Mutex::new(AggState {
                open: None,
                epoch: 0,
            }),
            queue: tx,
        })
    }

    fn timer_id(&self) -> String {
        format!("aggregator_user_{}", self.user_id)
    }

    /// Add a message: open a group or extend the current one, and reset
    /// the idle timer either way.
    pub async fn add(self: &Arc<Self>, msg: IncomingMessage) {
        let epoch = {
            let mut st = self.state.lock().unwrap_or_else(|e| e.into_inner());
            match &mut st.open {
                Some(group) => group.push(msg),
                None => {
                    debug!(user_id = self.user_id, "opening message group");
                    st.open = Some(MessageGroup::open(msg));
                }
            }
            st.epoch += 1;
            st.epoch
        };

        let me = Arc::clone(self);
        let idle = self.idle_timeout;
        self.tasks
            .register(
                &self.timer_id(),
                TaskMetadata::for_user("idle window timer", self.user_id),
                move |cancel| async move {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(idle) => me.fire(epoch),
                    }
                    Ok(())
                },
            )
            .await;
    }

    /// Timer callback: close the group only if no add() happened since the
    /// timer was armed.
    fn fire(&self, epoch: u64) {
        let group = {
            let mut st = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if st.epoch != epoch {
                return; // superseded by a later add or flush
            }
            st.open.take()
        };
        if let Some(group) = group {
            debug!(
                user_id = self.user_id,
                group_id = %group.group_id,
                messages = group.messages.len(),
                "idle window elapsed; closing group"
            );
            let _ = self.queue.send(group);
        }
    }

    /// Close and deliver the open group immediately.
    pub async fn flush(&self) {
        let group = {
            let mut st = self.state.lock().unwrap_or_else(|e| e.into_inner());
            st.epoch += 1; // invalidate any armed timer
            st.open.take()
        };
        if let Some(group) = group {
            debug!(user_id = self.user_id, group_id = %group.group_id, "explicit flush");
            let _ = self.queue.send(group);
        }
    }

    /// Cancel the timer and the dispatcher.  Groups already handed to the
    /// dispatcher are not rolled back; an open unflushed group is dropped.
    pub async fn stop(&self) {
        self.tasks.unregister(&self.timer_id()).await;
        self.tasks
            .unregister(&format!("dispatch_user_{}", self.user_id))
            .await;
    }

    pub fn has_open_group(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .open
            .is_some()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
