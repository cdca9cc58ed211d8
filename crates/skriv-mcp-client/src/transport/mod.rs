// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod sse;
pub mod stdio;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::client::McpError;

/// One direction of a connected transport: write frames out.  Incoming
/// frames arrive on the channel returned at connect time; the channel
/// closing means the connection is gone.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, frame: String) -> Result<(), McpError>;
    /// Tear the connection down.  Idempotent.
    async fn close(&self);
}

/// Everything a freshly-connected transport hands to the client.
pub struct TransportParts {
    pub transport: Box<dyn Transport>,
    /// Incoming JSON-RPC frames, one per message
    pub incoming: mpsc::Receiver<String>,
    /// Signalled by the reader once it is attached and consuming.  The
    /// client MUST await this before issuing `initialize`, closing the race
    /// where the response arrives before anyone is listening.
    pub ready: oneshot::Receiver<()>,
}
