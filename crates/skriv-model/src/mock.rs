// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::types::{ChatRequest, ChatResponse, Role};

/// Deterministic mock provider for tests.  Echoes the last user message
/// back as the assistant response.
#[derive(Default)]
pub struct MockProvider;

#[async_trait]
impl crate::ModelProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn chat(&self, req: ChatRequest) -> anyhow::Result<ChatResponse> {
        let reply = req
            .messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("[no input]")
            .to_string();
        Ok(ChatResponse::text(format!("MOCK: {reply}")))
    }
}

/// A pre-scripted mock provider.  Each `chat` call pops the next response
/// from the front of the queue, so tests can specify exact sequences —
/// including tool calls — without network access.  Calls beyond the script
/// return an error, which surfaces runaway loops in tests immediately.
pub struct ScriptedProvider {
    scripts: Arc<Mutex<Vec<anyhow::Result<ChatResponse>>>>,
    /// Every request seen by this provider, for post-hoc inspection.
    pub requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ChatResponse>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(responses.into_iter().map(Ok).collect())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Build a script that mixes successes and failures, for retry tests.
    pub fn from_results(results: Vec<anyhow::Result<ChatResponse>>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(results)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of `chat` calls made so far.
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl crate::ModelProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted-mock"
    }

    async fn chat(&self, req: ChatRequest) -> anyhow::Result<ChatResponse> {
        self.requests.lock().unwrap().push(req);
        let mut scripts = self.scripts.lock().unwrap();
        if scripts.is_empty() {
            anyhow::bail!("scripted provider exhausted");
        }
        scripts.remove(0)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
