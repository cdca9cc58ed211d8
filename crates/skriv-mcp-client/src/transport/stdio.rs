// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::process::Stdio;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, warn};

use super::{Transport, TransportParts};
use crate::client::McpError;

/// Child-process transport: newline-delimited JSON on stdin/stdout.
/// The child's stderr is drained to the log so a chatty server cannot
/// block on a full pipe.
pub struct StdioTransport {
    stdin: Mutex<ChildStdin>,
    child: Mutex<Option<Child>>,
}

impl StdioTransport {
    pub fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<TransportParts, McpError> {
        let mut child = Command::new(command)
            .args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| McpError::Transport(format!("spawning '{command}': {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Transport("child stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Transport("child stdout unavailable".into()))?;
        let stderr = child.stderr.take();

        let (tx, rx) = mpsc::channel::<String>(64);
        let (ready_tx, ready_rx) = oneshot::channel();

        tokio::spawn(async move {
            let mut lines = FramedRead::new(stdout, LinesCodec::new_with_max_length(4 * 1024 * 1024));
            // The reader is attached before any request can be written.
            let _ = ready_tx.send(());
            while let Some(line) = lines.next().await {
                match line {
                    Ok(line) if !line.trim().is_empty() => {
                        if tx.send(line).await.is_err() {
                            break; // client dropped the receiver
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "stdio transport read error");
                        break;
                    }
                }
            }
            debug!("stdio reader finished");
        });

        if let Some(stderr) = stderr {
            tokio::spawn(async move {
                let mut lines = FramedRead::new(stderr, LinesCodec::new());
                while let Some(Ok(line)) = lines.next().await {
                    debug!(target: "mcp_server_stderr", "{line}");
                }
            });
        }

        Ok(TransportParts {
            transport: Box::new(Self {
                stdin: Mutex::new(stdin),
                child: Mutex::new(Some(child)),
            }),
            incoming: rx,
            ready: ready_rx,
        })
    }
}

#[async_trait::async_trait]
impl Transport for StdioTransport {
    async fn send(&self, frame: String) -> Result<(), McpError> {
        // One writer at a time; the frame and its newline go out together.
        let mut stdin = self.stdin.lock().await;
        stdin
            .write_all(frame.as_bytes())
            .await
            .map_err(|e| McpError::Transport(format!("stdin write: {e}")))?;
        stdin
            .write_all(b"\n")
            .await
            .map_err(|e| McpError::Transport(format!("stdin write: {e}")))?;
        stdin
            .flush()
            .await
            .map_err(|e| McpError::Transport(format!("stdin flush: {e}")))?;
        Ok(())
    }

    async fn close(&self) {
        if let Some(mut child) = self.child.lock().await.take() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    /// `cat` echoes every line back — a minimal line-oriented server.
    #[tokio::test]
    async fn spawn_send_receive_roundtrip() {
        let mut parts =
            StdioTransport::spawn("cat", &[], &HashMap::new()).expect("cat spawns");
        parts.ready.await.unwrap();
        parts
            .transport
            .send(r#"{"jsonrpc":"2.0","id":1,"method":"x"}"#.to_string())
            .await
            .unwrap();
        let line = tokio::time::timeout(Duration::from_secs(5), parts.incoming.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(line.contains("\"id\":1"));
        parts.transport.close().await;
    }

    #[tokio::test]
    async fn missing_binary_is_transport_error() {
        let err = StdioTransport::spawn("definitely-not-a-real-binary-xyz", &[], &HashMap::new())
            .err()
            .expect("spawn must fail");
        assert!(matches!(err, McpError::Transport(_)));
    }

    #[tokio::test]
    async fn closing_child_closes_incoming_channel() {
        let mut parts = StdioTransport::spawn("cat", &[], &HashMap::new()).unwrap();
        parts.ready.await.unwrap();
        parts.transport.close().await;
        let next = tokio::time::timeout(Duration::from_secs(5), parts.incoming.recv())
            .await
            .unwrap();
        assert!(next.is_none());
    }
}
