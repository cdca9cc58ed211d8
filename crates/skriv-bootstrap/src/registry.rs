// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Centralised tool-registry builder.
//!
//! All callers use `build_tool_registry` instead of inlining their own
//! registration loops.  Adding a tool to skriv means adding it here once.

use std::sync::{Arc, Mutex};

use skriv_config::Config;
use skriv_mcp_client::{McpClient, McpToolAdapter};
use skriv_tools::{
    AnalyzeContentTool, FileCreateTool, FileDeleteTool, FileEditTool, FileMoveTool,
    FolderCreateTool, FolderDeleteTool, FolderMoveTool, GitCommandTool, GithubApiTool,
    KbListDirectoryTool, KbReadFileTool, KbSearchContentTool, KbSearchFilesTool, PlanTodoTool,
    ShellTool, TodoItem, ToolRegistry, WebSearchTool,
};

/// Build the registry with every built-in tool plus one adapter per tool
/// exposed by the connected MCP clients.
///
/// `todos` is shared with the task owner so plan updates are observable
/// from outside the loop.  The `shell` tool is registered only when the
/// config enables it.
pub fn build_tool_registry(
    cfg: &Config,
    todos: Arc<Mutex<Vec<TodoItem>>>,
    mcp_clients: &[Arc<McpClient>],
) -> ToolRegistry {
    let mut reg = ToolRegistry::new();

    // Planning
    reg.register(PlanTodoTool::new(todos));
    reg.register(AnalyzeContentTool);

    // KB read
    reg.register(KbReadFileTool);
    reg.register(KbListDirectoryTool);
    reg.register(KbSearchFilesTool);
    reg.register(KbSearchContentTool);

    // File ops
    reg.register(FileCreateTool);
    reg.register(FileEditTool);
    reg.register(FileDeleteTool);
    reg.register(FileMoveTool);

    // Folder ops
    reg.register(FolderCreateTool);
    reg.register(FolderDeleteTool);
    reg.register(FolderMoveTool);

    // External
    reg.register(WebSearchTool {
        api_key: cfg.tools.web_search_api_key.clone(),
    });
    reg.register(GitCommandTool);
    reg.register(GithubApiTool {
        token: cfg.tools.github_token.clone(),
    });
    if cfg.tools.enable_shell {
        reg.register(ShellTool {
            timeout_secs: cfg.tools.timeout_secs,
        });
    }

    // Dynamic MCP tools, names prefixed by their server.
    for client in mcp_clients {
        for tool in McpToolAdapter::wrap_all(client) {
            reg.register_arc(tool);
        }
    }

    reg
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_registers_builtins_without_shell() {
        let reg = build_tool_registry(&Config::default(), Arc::new(Mutex::new(Vec::new())), &[]);
        let names = reg.names();
        for expected in [
            "plan_todo",
            "analyze_content",
            "kb_read_file",
            "kb_list_directory",
            "kb_search_files",
            "kb_search_content",
            "file_create",
            "file_edit",
            "file_delete",
            "file_move",
            "folder_create",
            "folder_delete",
            "folder_move",
            "web_search",
            "git_command",
            "github_api",
        ] {
            assert!(names.contains(&expected.to_string()), "missing {expected}");
        }
        assert!(!names.contains(&"shell".to_string()));
    }

    #[test]
    fn shell_is_registered_when_enabled() {
        let mut cfg = Config::default();
        cfg.tools.enable_shell = true;
        let reg = build_tool_registry(&cfg, Arc::new(Mutex::new(Vec::new())), &[]);
        assert!(reg.names().contains(&"shell".to_string()));
    }
}
