// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};
use url::Url;

use super::{Transport, TransportParts};
use crate::client::McpError;

/// Name of the header carrying the server-assigned session id.
const SESSION_HEADER: &str = "Mcp-Session-Id";

/// HTTP+SSE transport: one long-lived GET producing an event stream, one
/// POST endpoint for outgoing messages.
///
/// The server announces the POST endpoint in the first `endpoint` event;
/// the reader signals readiness only after that arrives, so `initialize`
/// can never race the stream setup.  Responses and notifications arrive as
/// `message` events.
pub struct SseTransport {
    http: reqwest::Client,
    endpoint: watch::Receiver<Option<Url>>,
    session_id: Option<String>,
    shutdown: mpsc::Sender<()>,
}

impl SseTransport {
    pub async fn connect(base_url: &str, timeout: Duration) -> Result<TransportParts, McpError> {
        let url = Url::parse(base_url)
            .map_err(|e| McpError::Transport(format!("invalid MCP url '{base_url}': {e}")))?;
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| McpError::Transport(e.to_string()))?;

        let resp = http
            .get(url.clone())
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| McpError::Transport(format!("SSE connect: {e}")))?;
        if !resp.status().is_success() {
            return Err(McpError::Transport(format!(
                "SSE connect returned {}",
                resp.status()
            )));
        }
        let session_id = resp
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let (tx, rx) = mpsc::channel::<String>(64);
        let (ready_tx, ready_rx) = oneshot::channel();
        let (endpoint_tx, endpoint_rx) = watch::channel(None::<Url>);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let stream_url = url.clone();
        tokio::spawn(async move {
            let mut ready_tx = Some(ready_tx);
            let mut stream = resp.bytes_stream();
            let mut buf = String::new();
            let mut event_name = String::new();
            let mut data = String::new();
            loop {
                let chunk = tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    chunk = stream.next() => chunk,
                };
                let chunk = match chunk {
                    Some(Ok(c)) => c,
                    Some(Err(e)) => {
                        warn!(error = %e, "SSE stream error");
                        break;
                    }
                    None => break,
                };
                buf.push_str(&String::from_utf8_lossy(&chunk));

                // Process complete lines; an empty line terminates an event.
                while let Some(pos) = buf.find('\n') {
                    let line = buf[..pos].trim_end_matches('\r').to_string();
                    buf.drain(..=pos);
                    if let Some(name) = line.strip_prefix("event:") {
                        event_name = name.trim().to_string();
                    } else if let Some(d) = line.strip_prefix("data:") {
                        if !data.is_empty() {
                            data.push('\n');
                        }
                        data.push_str(d.trim_start());
                    } else if line.is_empty() && !data.is_empty() {
                        let payload = std::mem::take(&mut data);
                        let name = std::mem::take(&mut event_name);
                        match name.as_str() {
                            "endpoint" => {
                                match stream_url.join(payload.trim()) {
                                    Ok(ep) => {
                                        debug!(endpoint = %ep, "SSE endpoint received");
                                        let _ = endpoint_tx.send(Some(ep));
                                        // Reader attached AND endpoint known:
                                        // the connection is usable now.
                                        if let Some(r) = ready_tx.take() {
                                            let _ = r.send(());
                                        }
                                    }
                                    Err(e) => warn!(error = %e, "bad endpoint event"),
                                }
                            }
                            // "message" and unnamed events both carry frames.
                            _ => {
                                if tx.send(payload).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                }
            }
            debug!("SSE reader finished");
        });

        Ok(TransportParts {
            transport: Box::new(Self {
                http,
                endpoint: endpoint_rx,
                session_id,
                shutdown: shutdown_tx,
            }),
            incoming: rx,
            ready: ready_rx,
        })
    }
}

#[async_trait::async_trait]
impl Transport for SseTransport {
    async fn send(&self, frame: String) -> Result<(), McpError> {
        let endpoint = self
            .endpoint
            .borrow()
            .clone()
            .ok_or_else(|| McpError::Transport("SSE endpoint not announced yet".into()))?;
        let mut req = self
            .http
            .post(endpoint)
            .header("Content-Type", "application/json")
            .body(frame);
        if let Some(sid) = &self.session_id {
            req = req.header(SESSION_HEADER, sid);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| McpError::Transport(format!("SSE POST: {e}")))?;
        if !resp.status().is_success() {
            return Err(McpError::Transport(format!(
                "SSE POST returned {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn close(&self) {
        let _ = self.shutdown.send(()).await;
    }
}
