// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
pub mod builtin;
pub mod changes;
pub mod context;
pub mod registry;
pub mod sandbox;
pub mod tool;

pub use changes::KbChangesTracker;
pub use context::ToolContext;
pub use registry::{ToolRegistry, ToolSchema};
pub use sandbox::{resolve_sandboxed, SandboxError};
pub use tool::{Tool, ToolCall, ToolOutput};

pub use builtin::analyze_content::AnalyzeContentTool;
pub use builtin::file_create::FileCreateTool;
pub use builtin::file_delete::FileDeleteTool;
pub use builtin::file_edit::FileEditTool;
pub use builtin::file_move::FileMoveTool;
pub use builtin::folder_create::FolderCreateTool;
pub use builtin::folder_delete::FolderDeleteTool;
pub use builtin::folder_move::FolderMoveTool;
pub use builtin::git_command::GitCommandTool;
pub use builtin::github_api::GithubApiTool;
pub use builtin::kb_list_directory::KbListDirectoryTool;
pub use builtin::kb_read_file::KbReadFileTool;
pub use builtin::kb_search_content::KbSearchContentTool;
pub use builtin::kb_search_files::KbSearchFilesTool;
pub use builtin::plan_todo::{PlanTodoTool, TodoItem};
pub use builtin::shell::ShellTool;
pub use builtin::web_search::WebSearchTool;
