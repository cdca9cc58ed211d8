// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;

use crate::types::{ChatRequest, ChatResponse};

/// The LLM provider port.
///
/// The concrete provider (wire format, auth, endpoint) lives outside the
/// core; the orchestration layers only ever see this trait.  Transient
/// failures should be surfaced as errors — retry policy belongs to the
/// caller (see [`crate::retry_with_backoff`]).
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Human-readable provider name for status display and logs.
    fn name(&self) -> &str;

    /// Send one completion request and return the full response.
    async fn chat(&self, req: ChatRequest) -> anyhow::Result<ChatResponse>;

    /// Embed a batch of texts.
    ///
    /// The default implementation reports the capability as missing; only
    /// providers backing a vector index need to override it.
    async fn embed(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        anyhow::bail!("provider '{}' does not support embeddings", self.name())
    }
}
