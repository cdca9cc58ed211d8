// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::port::{BotError, BotPort, MessageHandle, SendOptions};
use crate::throttle::Throttle;

/// The outbound adapter: throttle + retry around a [`BotPort`].
///
/// Throttling is global — the underlying transport enforces one
/// account-wide limit, so every operation from every user draws from the
/// same bucket.  Retries apply only to [`BotError::is_retryable`] failures
/// and back off exponentially (`base * 2^k`).
pub struct Outbound {
    inner: Arc<dyn BotPort>,
    throttle: Throttle,
    max_attempts: u32,
    backoff_base: Duration,
}

impl Outbound {
    pub fn new(
        inner: Arc<dyn BotPort>,
        rate_per_sec: f64,
        max_attempts: u32,
        backoff_base: Duration,
    ) -> Self {
        Self {
            inner,
            throttle: Throttle::new(rate_per_sec),
            max_attempts: max_attempts.max(1),
            backoff_base,
        }
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        opts: &SendOptions,
    ) -> Result<MessageHandle, BotError> {
        self.run("send_message", || async move {
            self.inner.send_message(chat_id, text, opts).await
        })
        .await
    }

    pub async fn edit_message(
        &self,
        handle: &MessageHandle,
        text: &str,
        opts: &SendOptions,
    ) -> Result<(), BotError> {
        self.run("edit_message", || async move {
            self.inner.edit_message(handle, text, opts).await
        })
        .await
    }

    pub async fn delete_message(&self, handle: &MessageHandle) -> Result<(), BotError> {
        self.run("delete_message", || async move {
            self.inner.delete_message(handle).await
        })
        .await
    }

    async fn run<T, F, Fut>(&self, op: &'static str, mut call: F) -> Result<T, BotError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, BotError>>,
    {
        let mut attempt = 1u32;
        loop {
            self.throttle.acquire().await;
            debug!(op, attempt, "outbound attempt");
            match call().await {
                Ok(v) => {
                    if attempt > 1 {
                        info!(op, attempt, "delivery recovered after retry");
                    }
                    return Ok(v);
                }
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    // Honour an explicit retry-after hint when it exceeds
                    // our own backoff for this attempt.
                    let backoff = self.backoff_base * 2u32.saturating_pow(attempt - 1);
                    let delay = match &e {
                        BotError::RateLimited {
                            retry_after: Some(d),
                        } => backoff.max(*d),
                        _ => backoff,
                    };
                    warn!(op, attempt, error = %e, delay_ms = delay.as_millis() as u64, "retrying delivery");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(op, attempt, error = %e, "delivery failed");
                    return Err(e);
                }
            }
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
