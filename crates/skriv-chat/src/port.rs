// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::time::Duration;

use async_trait::async_trait;

/// Identifies a delivered message so it can later be edited or deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHandle {
    pub chat_id: i64,
    pub message_id: i64,
}

/// Formatting and behaviour flags for an outbound message.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Transport-specific parse mode, e.g. "Markdown"
    pub parse_mode: Option<String>,
    pub disable_notification: bool,
}

/// Failures surfaced by the concrete transport.
///
/// The retry wrapper keys off [`BotError::is_retryable`]: transient
/// transport trouble and rate limiting are retried with backoff, everything
/// else short-circuits.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rate limited by remote{}", retry_after.map(|d| format!(", retry after {d:?}")).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },
    #[error("message not found")]
    NotFound,
    #[error("permanent delivery failure: {0}")]
    Permanent(String),
}

impl BotError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, BotError::Transport(_) | BotError::RateLimited { .. })
    }
}

/// The outbound half of the chat transport.
///
/// Implementations wrap a concrete chat API; the core only ever talks to
/// the [`crate::Outbound`] wrapper, which layers throttling and retry on
/// top of this port.
#[async_trait]
pub trait BotPort: Send + Sync {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        opts: &SendOptions,
    ) -> Result<MessageHandle, BotError>;

    async fn edit_message(
        &self,
        handle: &MessageHandle,
        text: &str,
        opts: &SendOptions,
    ) -> Result<(), BotError>;

    async fn delete_message(&self, handle: &MessageHandle) -> Result<(), BotError>;
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_and_rate_limit_are_retryable() {
        assert!(BotError::Transport("conn reset".into()).is_retryable());
        assert!(BotError::RateLimited { retry_after: None }.is_retryable());
    }

    #[test]
    fn not_found_and_permanent_are_not() {
        assert!(!BotError::NotFound.is_retryable());
        assert!(!BotError::Permanent("blocked".into()).is_retryable());
    }
}
