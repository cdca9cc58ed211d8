// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Serde default helper — returns `true`.
///
/// `#[serde(default)]` on a `bool` always falls back to `bool::default()`
/// (i.e. `false`), so fields that should default to enabled need a named
/// function.
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub outbound: OutboundConfig,
    #[serde(default)]
    pub kb: KbConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub mcp: McpConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

impl Config {
    /// Validate cross-field constraints that serde defaults cannot express.
    ///
    /// The hosting binary maps a validation error to a non-zero exit code.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.aggregator.idle_timeout_secs == 0 {
            anyhow::bail!("aggregator.idle_timeout_secs must be > 0");
        }
        if self.outbound.rate_per_sec <= 0.0 {
            anyhow::bail!("outbound.rate_per_sec must be > 0");
        }
        if self.outbound.max_attempts == 0 {
            anyhow::bail!("outbound.max_attempts must be >= 1");
        }
        if self.agent.max_iterations == 0 {
            anyhow::bail!("agent.max_iterations must be >= 1");
        }
        if self.kb.root_dir.as_os_str().is_empty() {
            anyhow::bail!("kb.root_dir must not be empty");
        }
        Ok(())
    }
}

/// Per-user message batching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Seconds of user inactivity after which the open message group closes
    /// and is handed to the mode router.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

fn default_idle_timeout_secs() -> u64 {
    30
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

/// Processing mode for a closed message group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Turn the group into a curated note committed to the KB
    Note,
    /// Answer a question using the KB, read-only
    Ask,
    /// Full agent with read/write tools over the KB
    Agent,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Note => write!(f, "note"),
            Mode::Ask => write!(f, "ask"),
            Mode::Agent => write!(f, "agent"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Default mode for users that have not picked one
    #[serde(default = "default_mode")]
    pub default_mode: Mode,
    /// Maximum decision iterations per task before the loop gives up
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Wall-clock deadline for a single task, in seconds
    #[serde(default = "default_task_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries for transient model-provider failures within one task
    #[serde(default = "default_provider_retries")]
    pub provider_retries: u32,
    /// Base backoff for provider retries, in milliseconds
    #[serde(default = "default_provider_backoff_ms")]
    pub provider_backoff_ms: u64,
    /// External CLI driver command for the autonomous-external strategy.
    /// When set, the driver performs the loop itself and reports back a
    /// summary plus the set of changed files as JSON on stdout.
    pub external_driver: Option<String>,
}

fn default_mode() -> Mode {
    Mode::Note
}
fn default_max_iterations() -> u32 {
    20
}
fn default_task_timeout_secs() -> u64 {
    300
}
fn default_provider_retries() -> u32 {
    3
}
fn default_provider_backoff_ms() -> u64 {
    500
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            default_mode: default_mode(),
            max_iterations: default_max_iterations(),
            timeout_secs: default_task_timeout_secs(),
            provider_retries: default_provider_retries(),
            provider_backoff_ms: default_provider_backoff_ms(),
            external_driver: None,
        }
    }
}

/// Rate limiting and retry for outbound chat delivery.
///
/// The limit is global across users — the underlying transport enforces a
/// single account-wide ceiling, so per-user buckets would not help.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundConfig {
    /// Token-bucket refill rate, messages per second
    #[serde(default = "default_rate_per_sec")]
    pub rate_per_sec: f64,
    /// Maximum delivery attempts per logical send/edit
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base backoff in milliseconds; attempt k waits `base * 2^k`
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

fn default_rate_per_sec() -> f64 {
    30.0
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    250
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            rate_per_sec: default_rate_per_sec(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

/// Knowledge-base storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbConfig {
    /// Directory under which per-user KB roots live
    #[serde(default = "default_kb_root")]
    pub root_dir: PathBuf,
    /// Commit and push KB changes after each successful task
    #[serde(default = "default_true")]
    pub git_enabled: bool,
    /// Remote name used for push/pull; `origin` when unset
    pub git_remote: Option<String>,
    /// Explicit push branch.  When unset the currently checked-out branch
    /// is used; a detached HEAD is an error, never a silent fallback.
    pub git_branch: Option<String>,
    /// Restrict agent writes to `<kb_root>/topics/`
    #[serde(default = "default_true")]
    pub topics_only: bool,
}

fn default_kb_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("skriv/kb")
}

impl Default for KbConfig {
    fn default() -> Self {
        Self {
            root_dir: default_kb_root(),
            git_enabled: true,
            git_remote: None,
            git_branch: None,
            topics_only: true,
        }
    }
}

/// Content-hash deduplication log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// JSON-lines log path; one ProcessingRecord per line
    #[serde(default = "default_tracker_log")]
    pub log_path: PathBuf,
    /// Milliseconds to wait for the cross-process file lock before failing
    /// with `Busy`
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

fn default_tracker_log() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("skriv/processed.jsonl")
}
fn default_lock_timeout_ms() -> u64 {
    5_000
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            log_path: default_tracker_log(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

/// MCP server discovery directories.
///
/// Each directory holds one JSON object per file; definitions in a user's
/// subdirectory override shared ones with the same `name`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpConfig {
    /// Shared server definitions available to every user
    pub shared_dir: Option<PathBuf>,
    /// Parent of per-user subdirectories (`<user_dir>/<user_id>/*.json`)
    pub user_dir: Option<PathBuf>,
    /// Per-call timeout for MCP requests, in milliseconds
    #[serde(default = "default_mcp_timeout_ms")]
    pub call_timeout_ms: u64,
    /// Maximum reconnect attempts after a broken transport
    #[serde(default = "default_mcp_reconnects")]
    pub max_reconnects: u32,
}

fn default_mcp_timeout_ms() -> u64 {
    30_000
}
fn default_mcp_reconnects() -> u32 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Register the `shell` tool.  Off by default; path-like arguments go
    /// through the KB sandbox even when enabled.
    #[serde(default)]
    pub enable_shell: bool,
    /// Timeout in seconds for a single external tool call
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,
    /// API key for the web_search tool
    pub web_search_api_key: Option<String>,
    /// Token for the github_api tool
    pub github_token: Option<String>,
}

fn default_tool_timeout_secs() -> u64 {
    30
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enable_shell: false,
            timeout_secs: default_tool_timeout_secs(),
            web_search_api_key: None,
            github_token: None,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn zero_idle_timeout_rejected() {
        let mut cfg = Config::default();
        cfg.aggregator.idle_timeout_secs = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_rate_rejected() {
        let mut cfg = Config::default();
        cfg.outbound.rate_per_sec = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_attempts_rejected() {
        let mut cfg = Config::default();
        cfg.outbound.max_attempts = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn mode_round_trips_through_serde() {
        let yaml = "note";
        let m: Mode = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(m, Mode::Note);
        assert_eq!(serde_yaml::to_string(&m).unwrap().trim(), "note");
    }

    #[test]
    fn mode_display_is_lowercase() {
        assert_eq!(Mode::Ask.to_string(), "ask");
        assert_eq!(Mode::Agent.to_string(), "agent");
    }

    #[test]
    fn shell_disabled_by_default() {
        assert!(!ToolsConfig::default().enable_shell);
    }

    #[test]
    fn outbound_defaults_match_transport_limits() {
        let o = OutboundConfig::default();
        assert_eq!(o.rate_per_sec, 30.0);
        assert_eq!(o.max_attempts, 3);
    }
}
