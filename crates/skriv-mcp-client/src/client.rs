// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::Duration;

use rand::Rng;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex, Semaphore};
use tracing::{debug, info, warn};

use crate::protocol::{
    self, CallToolResult, GetPromptResult, InitializeParams, InitializeResult, Incoming,
    JsonRpcMessage, ListPromptsResult, ListResourcesResult, ListToolsResult, PromptDescriptor,
    ReadResourceResult, ResourceDescriptor, RpcError, ToolDescriptor, PROTOCOL_VERSION,
};
use crate::registry::ServerDefinition;
use crate::transport::{sse::SseTransport, stdio::StdioTransport, Transport, TransportParts};

#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("MCP call timed out")]
    Timeout,
    #[error("MCP connection lost")]
    Disconnected,
    #[error("MCP client is not connected")]
    NotConnected,
    #[error("MCP transport error: {0}")]
    Transport(String),
    #[error("{0}")]
    Rpc(RpcError),
    #[error("MCP protocol error: {0}")]
    Protocol(String),
}

impl McpError {
    /// Transient failures trigger one bounded reconnect + re-issue cycle.
    /// Timeouts and protocol-level errors do not — the server answered (or
    /// had the chance to), so re-sending risks duplicate side effects.
    fn is_transient(&self) -> bool {
        matches!(self, McpError::Transport(_) | McpError::Disconnected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone)]
pub struct McpClientConfig {
    pub call_timeout: Duration,
    pub connect_timeout: Duration,
    pub max_reconnects: u32,
    pub backoff_base: Duration,
    pub max_in_flight: usize,
}

impl Default for McpClientConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            max_reconnects: 3,
            backoff_base: Duration::from_millis(250),
            max_in_flight: 8,
        }
    }
}

type PendingMap = HashMap<u64, oneshot::Sender<Result<Value, McpError>>>;

/// State shared with the per-connection demux task.
struct Shared {
    pending: StdMutex<PendingMap>,
    state: RwLock<ConnectionState>,
    /// Bumped on every (re)connect so a stale demux task cannot mark a
    /// newer connection as dead.
    generation: AtomicU64,
}

impl Shared {
    fn cancel_pending(&self) {
        let waiters: Vec<_> = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.drain().collect()
        };
        for (_, tx) in waiters {
            let _ = tx.send(Err(McpError::Disconnected));
        }
    }
}

/// JSON-RPC 2.0 client for one MCP server.
///
/// Request ids are unique for the lifetime of the client; every request
/// registers its waiter in the pending map *before* the frame is written,
/// so a fast response can never be orphaned.  Writes are serialized behind
/// the transport mutex; one demux task per connection routes responses to
/// their waiters by id.
pub struct McpClient {
    def: ServerDefinition,
    cfg: McpClientConfig,
    next_id: AtomicU64,
    shared: Arc<Shared>,
    transport: Mutex<Option<Box<dyn Transport>>>,
    /// Serializes connect/reconnect/disconnect transitions
    conn_lock: Mutex<()>,
    tools: RwLock<Vec<ToolDescriptor>>,
    in_flight: Semaphore,
}

impl McpClient {
    pub fn new(def: ServerDefinition, cfg: McpClientConfig) -> Self {
        let max_in_flight = cfg.max_in_flight.max(1);
        Self {
            def,
            cfg,
            next_id: AtomicU64::new(1),
            shared: Arc::new(Shared {
                pending: StdMutex::new(HashMap::new()),
                state: RwLock::new(ConnectionState::Disconnected),
                generation: AtomicU64::new(0),
            }),
            transport: Mutex::new(None),
            conn_lock: Mutex::new(()),
            tools: RwLock::new(Vec::new()),
            in_flight: Semaphore::new(max_in_flight),
        }
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Connect and run the initialize handshake.
    pub async fn connect(&self) -> Result<(), McpError> {
        let _guard = self.conn_lock.lock().await;
        if self.state() == ConnectionState::Connected {
            return Ok(());
        }
        self.connect_inner().await
    }

    async fn connect_inner(&self) -> Result<(), McpError> {
        *self.shared.state.write().unwrap_or_else(|e| e.into_inner()) =
            ConnectionState::Connecting;

        let parts = self.build_transport().await?;
        let TransportParts {
            transport,
            incoming,
            ready,
        } = parts;

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        spawn_demux(Arc::clone(&self.shared), incoming, generation);

        // The reader MUST be consuming before initialize goes out, or the
        // response could arrive with nobody attached.
        match tokio::time::timeout(self.cfg.connect_timeout, ready).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                transport.close().await;
                return Err(McpError::Transport("reader exited before ready".into()));
            }
            Err(_) => {
                transport.close().await;
                return Err(McpError::Timeout);
            }
        }

        *self.transport.lock().await = Some(transport);

        let init_params = InitializeParams::new("skriv", env!("CARGO_PKG_VERSION"));
        let raw = self
            .request_once(
                "initialize",
                Some(serde_json::to_value(&init_params).map_err(protocol_err)?),
            )
            .await?;
        let init: InitializeResult = serde_json::from_value(raw).map_err(protocol_err)?;
        if init.protocol_version != PROTOCOL_VERSION {
            warn!(
                server = %self.def.name,
                server_version = %init.protocol_version,
                client_version = PROTOCOL_VERSION,
                "MCP protocol version mismatch; continuing"
            );
        }

        self.notify("notifications/initialized", None).await?;

        // Capture the tool catalog once; list_tools serves this cache.
        let raw = self.request_once("tools/list", None).await?;
        let listed: ListToolsResult = serde_json::from_value(raw).map_err(protocol_err)?;
        info!(
            server = %self.def.name,
            tools = listed.tools.len(),
            "MCP server connected"
        );
        *self.tools.write().unwrap_or_else(|e| e.into_inner()) = listed.tools;

        *self.shared.state.write().unwrap_or_else(|e| e.into_inner()) =
            ConnectionState::Connected;
        Ok(())
    }

    async fn build_transport(&self) -> Result<TransportParts, McpError> {
        match (&self.def.url, &self.def.command) {
            (Some(url), _) => {
                let timeout = self
                    .def
                    .timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or(self.cfg.connect_timeout);
                SseTransport::connect(url, timeout).await
            }
            (None, Some(command)) => {
                StdioTransport::spawn(command, &self.def.args, &self.def.env)
            }
            (None, None) => Err(McpError::Protocol(format!(
                "server '{}' defines neither command nor url",
                self.def.name
            ))),
        }
    }

    /// Close the transport and fail every pending waiter.
    pub async fn disconnect(&self) {
        let _guard = self.conn_lock.lock().await;
        self.teardown().await;
    }

    async fn teardown(&self) {
        if let Some(transport) = self.transport.lock().await.take() {
            transport.close().await;
        }
        self.shared.cancel_pending();
        *self.shared.state.write().unwrap_or_else(|e| e.into_inner()) =
            ConnectionState::Disconnected;
    }

    /// Bounded reconnect with jittered exponential backoff.  A concurrent
    /// caller that already reconnected turns this into a no-op.
    async fn reconnect(&self) -> Result<(), McpError> {
        let _guard = self.conn_lock.lock().await;
        if self.state() == ConnectionState::Connected {
            return Ok(());
        }
        for attempt in 0..self.cfg.max_reconnects {
            if attempt > 0 {
                let delay = self.cfg.backoff_base * 2u32.saturating_pow(attempt - 1);
                let jitter = {
                    let mut rng = rand::thread_rng();
                    delay.mul_f64(rng.gen_range(0.0..0.1))
                };
                tokio::time::sleep(delay + jitter).await;
            }
            self.teardown().await;
            match self.connect_inner().await {
                Ok(()) => {
                    info!(server = %self.def.name, attempt = attempt + 1, "MCP reconnected");
                    return Ok(());
                }
                Err(e) => {
                    warn!(server = %self.def.name, attempt = attempt + 1, error = %e, "MCP reconnect failed");
                }
            }
        }
        Err(McpError::Disconnected)
    }

    /// Issue a request; on a transient failure, reconnect once and re-issue
    /// only this call.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let _permit = self
            .in_flight
            .acquire()
            .await
            .map_err(|_| McpError::Disconnected)?;
        match self.request_once(method, params.clone()).await {
            Ok(v) => Ok(v),
            Err(e) if e.is_transient() => {
                debug!(server = %self.def.name, method, error = %e, "transient failure; reconnecting");
                self.reconnect().await?;
                self.request_once(method, params).await
            }
            Err(e) => Err(e),
        }
    }

    /// One request/response exchange with no retry policy.
    async fn request_once(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        // Waiter goes in before the frame goes out.
        self.shared
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, tx);

        let frame = JsonRpcMessage::request(id, method, params).to_line();
        if let Err(e) = self.send_frame(&frame).await {
            self.shared
                .pending
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.cfg.call_timeout, rx).await {
            Ok(Ok(result)) => result,
            // Sender dropped without a value: the map was cleared underneath us.
            Ok(Err(_)) => Err(McpError::Disconnected),
            Err(_) => {
                self.shared
                    .pending
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&id);
                Err(McpError::Timeout)
            }
        }
    }

    /// Fire-and-forget notification; no waiter, no reply.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        let frame = JsonRpcMessage::notification(method, params).to_line();
        self.send_frame(&frame).await
    }

    async fn send_frame(&self, frame: &str) -> Result<(), McpError> {
        let transport = self.transport.lock().await;
        match transport.as_ref() {
            Some(t) => t.send(frame.to_string()).await,
            None => Err(McpError::NotConnected),
        }
    }

    // ── MCP operations ───────────────────────────────────────────────────────

    /// Tool descriptors captured at initialize time.
    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.tools.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub async fn call_tool(&self, name: &str, args: Value) -> Result<CallToolResult, McpError> {
        let raw = self
            .request("tools/call", Some(json!({ "name": name, "arguments": args })))
            .await?;
        serde_json::from_value(raw).map_err(protocol_err)
    }

    pub async fn list_resources(&self) -> Result<Vec<ResourceDescriptor>, McpError> {
        let raw = self.request("resources/list", None).await?;
        let parsed: ListResourcesResult = serde_json::from_value(raw).map_err(protocol_err)?;
        Ok(parsed.resources)
    }

    pub async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, McpError> {
        let raw = self
            .request("resources/read", Some(json!({ "uri": uri })))
            .await?;
        serde_json::from_value(raw).map_err(protocol_err)
    }

    pub async fn list_prompts(&self) -> Result<Vec<PromptDescriptor>, McpError> {
        let raw = self.request("prompts/list", None).await?;
        let parsed: ListPromptsResult = serde_json::from_value(raw).map_err(protocol_err)?;
        Ok(parsed.prompts)
    }

    pub async fn get_prompt(
        &self,
        name: &str,
        args: Option<Value>,
    ) -> Result<GetPromptResult, McpError> {
        let mut params = json!({ "name": name });
        if let Some(args) = args {
            params["arguments"] = args;
        }
        let raw = self.request("prompts/get", Some(params)).await?;
        serde_json::from_value(raw).map_err(protocol_err)
    }
}

fn protocol_err(e: serde_json::Error) -> McpError {
    McpError::Protocol(e.to_string())
}

/// Route incoming frames to their waiters.  When the stream ends, this
/// marks the connection dead (unless a newer generation superseded it) and
/// fails every pending waiter.
fn spawn_demux(shared: Arc<Shared>, mut incoming: mpsc::Receiver<String>, generation: u64) {
    tokio::spawn(async move {
        while let Some(line) = incoming.recv().await {
            match protocol::parse_frame(&line) {
                Ok(Incoming::Response { id, result }) => {
                    let waiter = shared
                        .pending
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .remove(&id);
                    match waiter {
                        Some(tx) => {
                            let _ = tx.send(result.map_err(McpError::Rpc));
                        }
                        None => {
                            debug!(id, "response without waiter (timed out or cancelled)")
                        }
                    }
                }
                Ok(Incoming::Notification { method, .. }) => {
                    debug!(method, "MCP notification");
                }
                Ok(Incoming::Request { id, method }) => {
                    // This client advertises no server-callable capabilities.
                    warn!(id, method, "ignoring server-initiated request");
                }
                Err(e) => {
                    warn!(error = %e, "dropping malformed MCP frame");
                }
            }
        }
        if shared.generation.load(Ordering::SeqCst) == generation {
            debug!("MCP connection closed; cancelling waiters");
            shared.cancel_pending();
            *shared.state.write().unwrap_or_else(|e| e.into_inner()) =
                ConnectionState::Disconnected;
        }
    });
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap as Map;
    use std::io::Write;

    use super::*;

    /// Write a bash script that speaks just enough MCP to exercise the
    /// client: it echoes each request's own id back, so ordering does not
    /// matter.
    fn fake_server_script() -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            f,
            r##"#!/usr/bin/env bash
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
  case "$line" in
    *'"initialize"'*)
      printf '{{"jsonrpc":"2.0","id":%s,"result":{{"protocolVersion":"2024-11-05","capabilities":{{}},"serverInfo":{{"name":"fake"}}}}}}\n' "$id" ;;
    *'"tools/list"'*)
      printf '{{"jsonrpc":"2.0","id":%s,"result":{{"tools":[{{"name":"echo","description":"echoes text","inputSchema":{{"type":"object"}}}}]}}}}\n' "$id" ;;
    *'"tools/call"'*)
      printf '{{"jsonrpc":"2.0","id":%s,"result":{{"content":[{{"type":"text","text":"hello from server"}}],"isError":false}}}}\n' "$id" ;;
    *'"prompts/list"'*)
      printf '{{"jsonrpc":"2.0","id":%s,"result":{{"prompts":[]}}}}\n' "$id" ;;
    *'"boom"'*)
      printf '{{"jsonrpc":"2.0","id":%s,"error":{{"code":-32601,"message":"method not found"}}}}\n' "$id" ;;
  esac
done
"##
        )
        .unwrap();
        f.flush().unwrap();
        f
    }

    fn stdio_def(script: &tempfile::NamedTempFile) -> ServerDefinition {
        ServerDefinition {
            name: "fake".into(),
            description: "fake test server".into(),
            command: Some("bash".into()),
            args: vec![script.path().display().to_string()],
            env: Map::new(),
            url: None,
            timeout_ms: None,
            enabled: true,
        }
    }

    fn quick_cfg() -> McpClientConfig {
        McpClientConfig {
            call_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            max_reconnects: 2,
            backoff_base: Duration::from_millis(10),
            max_in_flight: 4,
        }
    }

    #[tokio::test]
    async fn connect_handshake_caches_tools() {
        let script = fake_server_script();
        let client = McpClient::new(stdio_def(&script), quick_cfg());
        client.connect().await.unwrap();
        assert_eq!(client.state(), ConnectionState::Connected);
        let tools = client.list_tools();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "echo");
        client.disconnect().await;
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn call_tool_resolves_content() {
        let script = fake_server_script();
        let client = McpClient::new(stdio_def(&script), quick_cfg());
        client.connect().await.unwrap();
        let result = client
            .call_tool("echo", json!({"text": "hi"}))
            .await
            .unwrap();
        assert_eq!(result.text(), "hello from server");
        assert_eq!(result.is_error, Some(false));
        client.disconnect().await;
    }

    #[tokio::test]
    async fn rpc_error_surfaces_as_rpc_variant() {
        let script = fake_server_script();
        let client = McpClient::new(stdio_def(&script), quick_cfg());
        client.connect().await.unwrap();
        let err = client.request("boom", None).await.unwrap_err();
        match err {
            McpError::Rpc(e) => assert_eq!(e.code, -32601),
            other => panic!("expected Rpc error, got {other}"),
        }
        client.disconnect().await;
    }

    #[tokio::test]
    async fn unanswered_request_times_out() {
        let script = fake_server_script();
        let mut cfg = quick_cfg();
        cfg.call_timeout = Duration::from_millis(200);
        let client = McpClient::new(stdio_def(&script), cfg);
        client.connect().await.unwrap();
        // The fake server ignores unknown methods without replying.
        let err = client.request("no/reply", None).await.unwrap_err();
        assert!(matches!(err, McpError::Timeout));
        // The waiter must have been cleaned up.
        assert!(client
            .shared
            .pending
            .lock()
            .unwrap()
            .is_empty());
        client.disconnect().await;
    }

    #[tokio::test]
    async fn request_ids_are_monotonically_unique() {
        let script = fake_server_script();
        let client = McpClient::new(stdio_def(&script), quick_cfg());
        client.connect().await.unwrap();
        let before = client.next_id.load(Ordering::SeqCst);
        client.list_prompts().await.unwrap();
        client.list_prompts().await.unwrap();
        assert_eq!(client.next_id.load(Ordering::SeqCst), before + 2);
        client.disconnect().await;
    }

    #[tokio::test]
    async fn request_without_connect_is_not_connected() {
        let script = fake_server_script();
        let client = McpClient::new(stdio_def(&script), quick_cfg());
        // A transient NotConnected?  No — NotConnected is not transient, so
        // it surfaces directly without a reconnect storm.
        let err = client.request_once("tools/list", None).await.unwrap_err();
        assert!(matches!(err, McpError::NotConnected));
    }

    #[tokio::test]
    async fn killed_server_triggers_reconnect_and_reissue() {
        let script = fake_server_script();
        let client = McpClient::new(stdio_def(&script), quick_cfg());
        client.connect().await.unwrap();

        // Kill the transport under the client: the next call sees the
        // broken pipe (or the closed channel), reconnects, and re-issues.
        client.transport.lock().await.as_ref().unwrap().close().await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let result = client.call_tool("echo", json!({})).await.unwrap();
        assert_eq!(result.text(), "hello from server");
        assert_eq!(client.state(), ConnectionState::Connected);
        client.disconnect().await;
    }

    #[tokio::test]
    async fn definition_without_command_or_url_fails() {
        let def = ServerDefinition {
            name: "broken".into(),
            description: String::new(),
            command: None,
            args: vec![],
            env: Map::new(),
            url: None,
            timeout_ms: None,
            enabled: true,
        };
        let client = McpClient::new(def, quick_cfg());
        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, McpError::Protocol(_)));
    }
}
