// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use skriv_config::Mode;

use crate::aggregator::Aggregator;
use crate::tasks::TaskManager;

/// Mutable per-user state behind the user's own lock.
#[derive(Default)]
pub struct UserState {
    pub mode: Option<Mode>,
    pub aggregator: Option<Arc<Aggregator>>,
    /// Short-lived dialog state (pending confirmations and the like)
    pub dialog: HashMap<String, String>,
}

/// One user's slot: a dedicated lock so create-or-get on the caches never
/// contends across users.
pub struct UserSlot {
    pub state: Mutex<UserState>,
}

/// Registry of per-user slots.
///
/// The outer lock guards only the map of slots; every state mutation goes
/// through the slot's own lock, so the check-then-create race on per-user
/// caches cannot happen and users never serialize against each other.
pub struct UserContexts {
    slots: Mutex<HashMap<i64, Arc<UserSlot>>>,
    default_mode: Mode,
}

impl UserContexts {
    pub fn new(default_mode: Mode) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            default_mode,
        }
    }

    /// Create-or-get the user's slot.
    pub async fn slot(&self, user_id: i64) -> Arc<UserSlot> {
        let mut slots = self.slots.lock().await;
        Arc::clone(slots.entry(user_id).or_insert_with(|| {
            debug!(user_id, "creating user slot");
            Arc::new(UserSlot {
                state: Mutex::new(UserState::default()),
            })
        }))
    }

    pub async fn mode(&self, user_id: i64) -> Mode {
        let slot = self.slot(user_id).await;
        let state = slot.state.lock().await;
        state.mode.unwrap_or(self.default_mode)
    }

    pub async fn set_mode(&self, user_id: i64, mode: Mode) {
        let slot = self.slot(user_id).await;
        slot.state.lock().await.mode = Some(mode);
        debug!(user_id, %mode, "mode set");
    }

    /// Create-or-get the user's aggregator.  `make` runs only when absent,
    /// under the user's own lock, so exactly one aggregator exists per
    /// user.
    pub async fn aggregator<F, Fut>(&self, user_id: i64, make: F) -> Arc<Aggregator>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Arc<Aggregator>>,
    {
        let slot = self.slot(user_id).await;
        let mut state = slot.state.lock().await;
        match &state.aggregator {
            Some(agg) => Arc::clone(agg),
            None => {
                let agg = make().await;
                state.aggregator = Some(Arc::clone(&agg));
                agg
            }
        }
    }

    /// Tear down the user's agent-facing state after a settings change.
    /// The aggregator's tasks are stopped through the [`TaskManager`]; the
    /// next message recreates everything lazily.
    pub async fn reset(&self, user_id: i64, _tasks: &TaskManager) {
        let slot = self.slot(user_id).await;
        let aggregator = {
            let mut state = slot.state.lock().await;
            state.dialog.clear();
            state.aggregator.take()
        };
        if let Some(agg) = aggregator {
            agg.stop().await;
            debug!(user_id, "user agent state torn down");
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn default_mode_until_set() {
        let users = UserContexts::new(Mode::Note);
        assert_eq!(users.mode(7).await, Mode::Note);
        users.set_mode(7, Mode::Ask).await;
        assert_eq!(users.mode(7).await, Mode::Ask);
        // Other users are unaffected.
        assert_eq!(users.mode(8).await, Mode::Note);
    }

    #[tokio::test]
    async fn aggregator_is_created_once_under_contention() {
        let users = Arc::new(UserContexts::new(Mode::Note));
        let tasks = Arc::new(TaskManager::new(Duration::from_millis(200)));
        let created = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let users = Arc::clone(&users);
            let tasks = Arc::clone(&tasks);
            let created = Arc::clone(&created);
            handles.push(tokio::spawn(async move {
                users
                    .aggregator(42, || {
                        let tasks = Arc::clone(&tasks);
                        let created = Arc::clone(&created);
                        async move {
                            created.fetch_add(1, Ordering::SeqCst);
                            Aggregator::spawn(
                                42,
                                Duration::from_secs(30),
                                tasks,
                                Arc::new(|_g| Box::pin(async {})),
                            )
                            .await
                        }
                    })
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(created.load(Ordering::SeqCst), 1);
        tasks.stop().await;
    }

    #[tokio::test]
    async fn reset_drops_aggregator_for_lazy_recreation() {
        let users = UserContexts::new(Mode::Note);
        let tasks = Arc::new(TaskManager::new(Duration::from_millis(200)));
        users
            .aggregator(1, || {
                let tasks = Arc::clone(&tasks);
                async move {
                    Aggregator::spawn(
                        1,
                        Duration::from_secs(30),
                        tasks,
                        Arc::new(|_g| Box::pin(async {})),
                    )
                    .await
                }
            })
            .await;
        users.reset(1, &tasks).await;
        let slot = users.slot(1).await;
        assert!(slot.state.lock().await.aggregator.is_none());
        // The aggregator's background tasks are gone too.
        assert!(tasks.is_empty().await);
    }
}
