// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use skriv_config::Mode;
use skriv_tools::{Tool, ToolCall, ToolContext, ToolOutput};

use crate::client::{McpClient, McpError};
use crate::protocol::ToolDescriptor;

/// Wraps one remote MCP tool as a [`skriv_tools::Tool`].
///
/// The registry name is prefixed with the server name so two servers may
/// expose tools with the same short name.  The calling user's id is
/// attached to the arguments so multi-tenant servers can filter by user.
/// Protocol-level failures come back as tool errors, never as panics or
/// Rust errors — the agent loop treats them like any other tool failure.
pub struct McpToolAdapter {
    registry_name: String,
    description: String,
    descriptor: ToolDescriptor,
    client: Arc<McpClient>,
}

impl McpToolAdapter {
    pub fn new(client: Arc<McpClient>, descriptor: ToolDescriptor) -> Self {
        let registry_name = format!("{}_{}", client.name(), descriptor.name);
        let description = descriptor
            .description
            .clone()
            .unwrap_or_else(|| format!("Tool '{}' on MCP server '{}'", descriptor.name, client.name()));
        Self {
            registry_name,
            description,
            descriptor,
            client,
        }
    }

    /// Wrap every tool a connected client exposes.
    pub fn wrap_all(client: &Arc<McpClient>) -> Vec<Arc<dyn Tool>> {
        client
            .list_tools()
            .into_iter()
            .map(|d| Arc::new(Self::new(Arc::clone(client), d)) as Arc<dyn Tool>)
            .collect()
    }
}

#[async_trait]
impl Tool for McpToolAdapter {
    fn name(&self) -> &str {
        &self.registry_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.descriptor.input_schema.clone()
    }

    fn modes(&self) -> &[Mode] {
        // Remote tools may mutate arbitrary server-side state, so they are
        // offered only where local mutating tools are.
        &[Mode::Agent]
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> ToolOutput {
        let mut args = call.args.clone();
        if let Value::Object(map) = &mut args {
            map.entry("user_id")
                .or_insert_with(|| Value::from(ctx.user_id));
        }

        match self.client.call_tool(&self.descriptor.name, args).await {
            Ok(result) => {
                let text = result.text();
                if result.is_error.unwrap_or(false) {
                    ToolOutput::err(&call.id, text)
                } else {
                    ToolOutput::ok(&call.id, text)
                }
            }
            Err(McpError::Rpc(e)) => ToolOutput::err(&call.id, e.to_string()),
            Err(e) => ToolOutput::err(
                &call.id,
                format!("MCP server '{}' unavailable: {e}", self.client.name()),
            ),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
