// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use skriv_config::Mode;

use crate::context::ToolContext;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// A tool schema – mirrors skriv_model::ToolSchema but keeps the tools
/// crate independent from the model crate.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Central registry holding all tools available to one user's tasks.
///
/// Registration happens once, from the composition root; the registry is
/// immutable afterwards, which is what makes concurrent `execute` calls
/// safe.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    /// Register an already-shared tool (used for dynamic MCP wrappers).
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Produce schemas only for tools available in the given mode.
    pub fn schemas_for_mode(&self, mode: Mode) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .values()
            .filter(|t| t.modes().contains(&mode))
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Execute a direct, internally-issued call (e.g. the router writing
    /// the note file inside its own critical section).  No mode policy
    /// applies on this path — the caller is trusted code, not the model.
    pub async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> ToolOutput {
        match self.tools.get(&call.name) {
            Some(tool) => tool.execute(call, ctx).await,
            None => ToolOutput::err(&call.id, format!("unknown tool: {}", call.name)),
        }
    }

    /// Execute a model-issued call under the mode policy.
    ///
    /// A tool whose `modes()` excludes `mode` is rejected with a tool
    /// error instead of running — `schemas_for_mode` keeps such tools out
    /// of the model's schema list, but a misbehaving provider can still
    /// emit a call for one, and the registry is where that write access is
    /// actually denied.
    pub async fn execute_for_mode(
        &self,
        call: &ToolCall,
        mode: Mode,
        ctx: &ToolContext,
    ) -> ToolOutput {
        match self.tools.get(&call.name) {
            Some(tool) if !tool.modes().contains(&mode) => ToolOutput::err(
                &call.id,
                format!("tool '{}' is not available in {mode} mode", call.name),
            ),
            Some(tool) => tool.execute(call, ctx).await,
            None => ToolOutput::err(&call.id, format!("unknown tool: {}", call.name)),
        }
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::{json, Value};
    use skriv_events::EventBus;

    use super::*;

    /// Minimal no-op tool for registry tests.
    struct EchoTool {
        name: &'static str,
        modes: &'static [Mode],
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object" })
        }
        fn modes(&self) -> &[Mode] {
            self.modes
        }
        async fn execute(&self, call: &ToolCall, _ctx: &ToolContext) -> ToolOutput {
            ToolOutput::ok(&call.id, format!("echo:{}", call.args))
        }
    }

    const ALL: &[Mode] = &[Mode::Note, Mode::Ask, Mode::Agent];
    const AGENT_ONLY: &[Mode] = &[Mode::Agent];

    fn ctx() -> ToolContext {
        ToolContext::new(1, "kb", "/tmp/kb", false, "t", Arc::new(EventBus::new()))
    }

    #[test]
    fn register_and_get() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "echo", modes: ALL });
        assert!(reg.get("echo").is_some());
        assert!(reg.get("nope").is_none());
    }

    #[test]
    fn schemas_filtered_by_mode() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "read", modes: ALL });
        reg.register(EchoTool { name: "write", modes: AGENT_ONLY });
        let ask = reg.schemas_for_mode(Mode::Ask);
        assert!(ask.iter().any(|s| s.name == "read"));
        assert!(!ask.iter().any(|s| s.name == "write"));
        let agent = reg.schemas_for_mode(Mode::Agent);
        assert_eq!(agent.len(), 2);
    }

    #[test]
    fn schemas_are_sorted_by_name() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "zeta", modes: ALL });
        reg.register(EchoTool { name: "alpha", modes: ALL });
        let names: Vec<_> = reg
            .schemas_for_mode(Mode::Note)
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[tokio::test]
    async fn execute_known_tool_succeeds() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "echo", modes: ALL });
        let out = reg
            .execute(&ToolCall::new("1", "echo", json!({"x": 1})), &ctx())
            .await;
        assert!(!out.is_error);
        assert!(out.content.starts_with("echo:"));
    }

    #[tokio::test]
    async fn execute_unknown_tool_returns_error() {
        let reg = ToolRegistry::new();
        let out = reg
            .execute(&ToolCall::new("x", "missing", json!({})), &ctx())
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("unknown tool"));
    }

    #[tokio::test]
    async fn execute_for_mode_rejects_out_of_mode_tool() {
        // schemas_for_mode keeps the tool out of the model's list, but a
        // call that arrives anyway must be denied here, not executed.
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "write", modes: AGENT_ONLY });
        let out = reg
            .execute_for_mode(&ToolCall::new("1", "write", json!({})), Mode::Ask, &ctx())
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("not available in ask mode"));
    }

    #[tokio::test]
    async fn execute_for_mode_allows_in_mode_tool() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "write", modes: AGENT_ONLY });
        let out = reg
            .execute_for_mode(&ToolCall::new("1", "write", json!({})), Mode::Agent, &ctx())
            .await;
        assert!(!out.is_error);
    }

    #[tokio::test]
    async fn execute_for_mode_reports_unknown_tool() {
        let reg = ToolRegistry::new();
        let out = reg
            .execute_for_mode(&ToolCall::new("1", "nope", json!({})), Mode::Agent, &ctx())
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("unknown tool"));
    }

    #[tokio::test]
    async fn direct_execute_bypasses_mode_policy() {
        // The router's own internal calls (note-flow file_create) use the
        // unfiltered path regardless of the user's mode.
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "write", modes: AGENT_ONLY });
        let out = reg
            .execute(&ToolCall::new("1", "write", json!({})), &ctx())
            .await;
        assert!(!out.is_error);
    }

    #[test]
    fn registering_same_name_twice_overwrites() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "t", modes: ALL });
        reg.register(EchoTool { name: "t", modes: ALL });
        assert_eq!(reg.names().len(), 1);
    }
}
