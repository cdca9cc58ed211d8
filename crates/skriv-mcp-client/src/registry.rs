// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One MCP server definition, loaded from a JSON file.
///
/// Either `command` (stdio) or `url` (HTTP+SSE) must be present; a file in
/// a user's directory overrides a shared file with the same `name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub url: Option<String>,
    /// Per-call timeout override in milliseconds (HTTP/SSE servers)
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Load server definitions from the shared directory, then let the user's
/// own directory override by `name`.  Disabled and malformed definitions
/// are dropped (malformed ones with a warning — one bad file must not take
/// discovery down).
pub fn discover_servers(
    shared_dir: Option<&Path>,
    user_dir: Option<&Path>,
) -> Vec<ServerDefinition> {
    let mut by_name: HashMap<String, ServerDefinition> = HashMap::new();

    for dir in [shared_dir, user_dir].into_iter().flatten() {
        for def in load_dir(dir) {
            by_name.insert(def.name.clone(), def);
        }
    }

    let mut servers: Vec<ServerDefinition> = by_name
        .into_values()
        .filter(|d| {
            if !d.enabled {
                debug!(server = %d.name, "skipping disabled MCP server");
            }
            d.enabled
        })
        .collect();
    servers.sort_by(|a, b| a.name.cmp(&b.name));
    servers
}

fn load_dir(dir: &Path) -> Vec<ServerDefinition> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return Vec::new(),
    };
    let mut out = Vec::new();
    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        if path.extension().map(|e| e != "json").unwrap_or(true) {
            continue;
        }
        let text = match std::fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read MCP server file");
                continue;
            }
        };
        match serde_json::from_str::<ServerDefinition>(&text) {
            Ok(def) => out.push(def),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring malformed MCP server file");
            }
        }
    }
    out
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn write_def(dir: &Path, file: &str, json: &str) {
        std::fs::write(dir.join(file), json).unwrap();
    }

    #[test]
    fn discovers_shared_definitions() {
        let dir = tempfile::tempdir().unwrap();
        write_def(
            dir.path(),
            "files.json",
            r#"{"name":"files","description":"fs server","command":"mcp-files","args":["--root","/tmp"],"env":{},"enabled":true}"#,
        );
        let servers = discover_servers(Some(dir.path()), None);
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].name, "files");
        assert_eq!(servers[0].args, vec!["--root", "/tmp"]);
    }

    #[test]
    fn user_definition_overrides_shared_by_name() {
        let shared = tempfile::tempdir().unwrap();
        let user = tempfile::tempdir().unwrap();
        write_def(
            shared.path(),
            "s.json",
            r#"{"name":"files","command":"shared-binary"}"#,
        );
        write_def(
            user.path(),
            "u.json",
            r#"{"name":"files","command":"user-binary"}"#,
        );
        let servers = discover_servers(Some(shared.path()), Some(user.path()));
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].command.as_deref(), Some("user-binary"));
    }

    #[test]
    fn disabled_servers_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        write_def(
            dir.path(),
            "off.json",
            r#"{"name":"off","command":"x","enabled":false}"#,
        );
        assert!(discover_servers(Some(dir.path()), None).is_empty());
    }

    #[test]
    fn malformed_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_def(dir.path(), "bad.json", "{ not json");
        write_def(dir.path(), "good.json", r#"{"name":"ok","command":"x"}"#);
        let servers = discover_servers(Some(dir.path()), None);
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].name, "ok");
    }

    #[test]
    fn sse_definition_parses_url_and_timeout() {
        let dir = tempfile::tempdir().unwrap();
        write_def(
            dir.path(),
            "http.json",
            r#"{"name":"remote","description":"hosted","url":"https://mcp.example.com/sse","timeout_ms":15000,"enabled":true}"#,
        );
        let servers = discover_servers(Some(dir.path()), None);
        assert_eq!(servers[0].url.as_deref(), Some("https://mcp.example.com/sse"));
        assert_eq!(servers[0].timeout_ms, Some(15_000));
    }

    #[test]
    fn missing_directories_yield_empty() {
        assert!(discover_servers(Some(Path::new("/nonexistent/x")), None).is_empty());
        assert!(discover_servers(None, None).is_empty());
    }
}
