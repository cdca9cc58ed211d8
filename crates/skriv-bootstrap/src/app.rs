// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use skriv_chat::{BotPort, IncomingMessage, Outbound};
use skriv_config::{Config, Mode};
use skriv_core::{
    Agent, Aggregator, DecisionStrategy, ExternalStrategy, ModelStrategy, Router, TaskManager,
    TaskMetadata, UserContexts,
};
use skriv_events::EventBus;
use skriv_kb::{GitSync, KbIndexer, KbLockManager, KbRegistry, ProcessingTracker};
use skriv_mcp_client::{discover_servers, McpClient, McpClientConfig};
use skriv_model::ModelProvider;
use skriv_tools::TodoItem;

use crate::registry::build_tool_registry;

/// The assembled application.
///
/// Owns every long-lived service and exposes the two operations the chat
/// front-end needs: feed a message in, change a user's mode.  Everything
/// else happens behind the ports.
pub struct App {
    cfg: Config,
    users: Arc<UserContexts>,
    router: Arc<Router>,
    tasks: Arc<TaskManager>,
    mcp_clients: Vec<Arc<McpClient>>,
    /// Shared with `plan_todo` so progress is observable
    pub todos: Arc<Mutex<Vec<TodoItem>>>,
}

impl App {
    /// Wire everything up.  MCP servers that fail to connect are skipped
    /// with a warning — a broken side-car must not take the core down.
    pub async fn build(
        cfg: Config,
        bot: Arc<dyn BotPort>,
        provider: Arc<dyn ModelProvider>,
    ) -> anyhow::Result<Self> {
        let bus = Arc::new(EventBus::new());
        let tasks = Arc::new(TaskManager::new(Duration::from_secs(5)));
        let users = Arc::new(UserContexts::new(cfg.agent.default_mode));
        let locks = Arc::new(KbLockManager::new(Duration::from_secs(10)));
        let kbs = Arc::new(KbRegistry::new(
            cfg.kb.root_dir.clone(),
            cfg.kb.git_enabled,
        ));
        let tracker = Arc::new(
            ProcessingTracker::open(
                cfg.tracker.log_path.clone(),
                Duration::from_millis(cfg.tracker.lock_timeout_ms),
            )
            .context("opening processing log")?,
        );
        let git = Arc::new(GitSync::new(Arc::clone(&bus)));
        let outbound = Arc::new(Outbound::new(
            bot,
            cfg.outbound.rate_per_sec,
            cfg.outbound.max_attempts,
            Duration::from_millis(cfg.outbound.backoff_base_ms),
        ));

        // MCP discovery: shared definitions now; per-user files override by
        // name at discovery time.
        let mcp_cfg = McpClientConfig {
            call_timeout: Duration::from_millis(cfg.mcp.call_timeout_ms),
            max_reconnects: cfg.mcp.max_reconnects,
            ..McpClientConfig::default()
        };
        let mut mcp_clients = Vec::new();
        for def in discover_servers(cfg.mcp.shared_dir.as_deref(), cfg.mcp.user_dir.as_deref()) {
            let client = Arc::new(McpClient::new(def, mcp_cfg.clone()));
            match client.connect().await {
                Ok(()) => mcp_clients.push(client),
                Err(e) => warn!(server = %client.name(), error = %e, "MCP server unavailable; skipping"),
            }
        }

        let todos = Arc::new(Mutex::new(Vec::new()));
        let registry = Arc::new(build_tool_registry(&cfg, Arc::clone(&todos), &mcp_clients));

        // Decision strategy: the external CLI driver when configured, the
        // model-driven loop otherwise.
        let strategy: Arc<dyn DecisionStrategy> = match &cfg.agent.external_driver {
            Some(command) => Arc::new(ExternalStrategy::new(command.clone())),
            None => Arc::new(ModelStrategy::new(provider)),
        };
        let agent = Arc::new(Agent::new(
            strategy,
            registry,
            cfg.agent.provider_retries,
            Duration::from_millis(cfg.agent.provider_backoff_ms),
        ));

        let router = Arc::new(Router::new(
            Arc::clone(&users),
            Arc::clone(&kbs),
            Arc::clone(&locks),
            tracker,
            git,
            Arc::clone(&bus),
            outbound,
            agent,
            cfg.agent.clone(),
            cfg.kb.topics_only,
        ));

        // The indexer reacts to KB change events in the background.
        let indexer = KbIndexer::new(&bus, kbs, locks);
        tasks
            .register(
                "indexer",
                TaskMetadata::new("KB index rebuilder"),
                move |cancel| async move {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = indexer.run() => {}
                    }
                    Ok(())
                },
            )
            .await;

        info!(
            mcp_servers = mcp_clients.len(),
            "application assembled"
        );
        Ok(Self {
            cfg,
            users,
            router,
            tasks,
            mcp_clients,
            todos,
        })
    }

    /// Feed one inbound chat message into the user's aggregator, creating
    /// the aggregator (and its dispatcher) lazily.
    pub async fn handle_message(&self, msg: IncomingMessage) {
        let user_id = msg.user_id;
        let idle = Duration::from_secs(self.cfg.aggregator.idle_timeout_secs);
        let tasks = Arc::clone(&self.tasks);
        let router = Arc::clone(&self.router);

        let aggregator = self
            .users
            .aggregator(user_id, || async move {
                Aggregator::spawn(
                    user_id,
                    idle,
                    tasks,
                    Arc::new(move |group| {
                        let router = Arc::clone(&router);
                        Box::pin(async move { router.route(group).await })
                    }),
                )
                .await
            })
            .await;
        aggregator.add(msg).await;
    }

    /// Change a user's processing mode and tear their agent state down for
    /// lazy recreation.
    pub async fn set_mode(&self, user_id: i64, mode: Mode) {
        self.users.set_mode(user_id, mode).await;
        self.users.reset(user_id, &self.tasks).await;
    }

    /// Flush a user's open group immediately (front-end `/flush` command).
    pub async fn flush_user(&self, user_id: i64) {
        let slot = self.users.slot(user_id).await;
        let aggregator = slot.state.lock().await.aggregator.clone();
        if let Some(agg) = aggregator {
            agg.flush().await;
        }
    }

    /// Drain background work and disconnect MCP servers.
    pub async fn shutdown(&self) {
        info!("shutting down");
        self.tasks.stop().await;
        for client in &self.mcp_clients {
            client.disconnect().await;
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Mutex as PlainMutex;

    use async_trait::async_trait;
    use skriv_chat::{BotError, MessageHandle, SendOptions};
    use skriv_model::{ChatResponse, ScriptedProvider};

    use super::*;

    #[derive(Default)]
    struct RecordingBot {
        sent: PlainMutex<Vec<String>>,
        edits: PlainMutex<Vec<String>>,
        next_id: AtomicI64,
    }

    #[async_trait]
    impl BotPort for RecordingBot {
        async fn send_message(
            &self,
            chat_id: i64,
            text: &str,
            _opts: &SendOptions,
        ) -> Result<MessageHandle, BotError> {
            self.sent.lock().unwrap().push(text.to_string());
            Ok(MessageHandle {
                chat_id,
                message_id: self.next_id.fetch_add(1, Ordering::SeqCst),
            })
        }

        async fn edit_message(
            &self,
            _h: &MessageHandle,
            text: &str,
            _opts: &SendOptions,
        ) -> Result<(), BotError> {
            self.edits.lock().unwrap().push(text.to_string());
            Ok(())
        }

        async fn delete_message(&self, _h: &MessageHandle) -> Result<(), BotError> {
            Ok(())
        }
    }

    fn test_config(dir: &tempfile::TempDir) -> Config {
        let mut cfg = Config::default();
        cfg.kb.root_dir = dir.path().join("kbs");
        cfg.kb.git_enabled = false;
        cfg.tracker.log_path = dir.path().join("processed.jsonl");
        cfg.aggregator.idle_timeout_secs = 1;
        cfg
    }

    #[tokio::test(start_paused = true)]
    async fn message_flows_end_to_end_into_a_note() {
        let dir = tempfile::tempdir().unwrap();
        let bot = Arc::new(RecordingBot::default());
        let provider = Arc::new(ScriptedProvider::new(vec![
            ChatResponse::text("plan"),
            ChatResponse::text(
                "# Quick Fact\n\nbody\n\n```metadata\ncategory: misc\n```\n",
            ),
        ]));
        let app = App::build(
            test_config(&dir),
            Arc::clone(&bot) as Arc<dyn BotPort>,
            provider,
        )
        .await
        .unwrap();

        app.handle_message(IncomingMessage::text_only(42, 7, 1, "a quick fact"))
            .await;
        // Idle window (1s) elapses, the group routes, the note lands.
        tokio::time::sleep(Duration::from_secs(2)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let edits = bot.edits.lock().unwrap();
        assert_eq!(edits.len(), 1, "sent: {:?}", bot.sent.lock().unwrap());
        assert!(edits[0].starts_with("Done: topics/misc/"));
        drop(edits);
        app.shutdown().await;
    }

    #[tokio::test]
    async fn set_mode_then_reset_recreates_aggregator_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let bot = Arc::new(RecordingBot::default());
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let app = App::build(
            test_config(&dir),
            Arc::clone(&bot) as Arc<dyn BotPort>,
            provider,
        )
        .await
        .unwrap();

        app.handle_message(IncomingMessage::text_only(1, 1, 1, "x"))
            .await;
        let before = app.users.slot(1).await;
        assert!(before.state.lock().await.aggregator.is_some());

        app.set_mode(1, Mode::Ask).await;
        assert!(before.state.lock().await.aggregator.is_none());

        // Next message recreates it.
        app.handle_message(IncomingMessage::text_only(1, 1, 2, "y"))
            .await;
        assert!(before.state.lock().await.aggregator.is_some());
        app.shutdown().await;
    }
}
