// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::context::ToolContext;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// A structured plan item managed by the plan_todo tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoItem {
    pub content: String,
    /// One of: "pending", "in_progress", "completed"
    pub status: String,
}

/// Lets the agent write down and revise its plan.  The current list is
/// shared with the task owner so progress can be surfaced to the user.
pub struct PlanTodoTool {
    todos: Arc<Mutex<Vec<TodoItem>>>,
}

impl PlanTodoTool {
    pub fn new(todos: Arc<Mutex<Vec<TodoItem>>>) -> Self {
        Self { todos }
    }
}

#[async_trait]
impl Tool for PlanTodoTool {
    fn name(&self) -> &str {
        "plan_todo"
    }

    fn description(&self) -> &str {
        "Replace the task plan with an updated todo list. Use it once at the start \
         to lay out the steps and again whenever a step is completed or the plan \
         changes. Each item needs 'content' and a 'status' of pending, in_progress \
         or completed."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "items": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "content": { "type": "string" },
                            "status": { "type": "string", "enum": ["pending", "in_progress", "completed"] }
                        },
                        "required": ["content", "status"]
                    }
                }
            },
            "required": ["items"]
        })
    }

    async fn execute(&self, call: &ToolCall, _ctx: &ToolContext) -> ToolOutput {
        let items: Vec<TodoItem> = match call
            .args
            .get("items")
            .map(|v| serde_json::from_value(v.clone()))
        {
            Some(Ok(items)) => items,
            Some(Err(e)) => return ToolOutput::err(&call.id, format!("invalid items: {e}")),
            None => return ToolOutput::err(&call.id, "missing required parameter 'items'"),
        };

        let rendered: String = items
            .iter()
            .map(|t| {
                let mark = match t.status.as_str() {
                    "completed" => "x",
                    "in_progress" => "~",
                    _ => " ",
                };
                format!("[{mark}] {}\n", t.content)
            })
            .collect();

        *self.todos.lock().unwrap_or_else(|e| e.into_inner()) = items;
        ToolOutput::ok(&call.id, format!("Plan updated:\n{rendered}"))
    }
}
