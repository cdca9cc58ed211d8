// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

/// Run `op` up to `1 + retries` times with exponential backoff between
/// attempts: `base * 2^k` plus up to 10% jitter so concurrent callers do
/// not retry in lockstep.
///
/// The operation factory is re-invoked for each attempt.  The final error
/// is returned when all attempts fail.
pub async fn retry_with_backoff<T, F, Fut>(
    what: &str,
    retries: u32,
    base: Duration,
    mut op: F,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(v) => {
                if attempt > 0 {
                    warn!(what, attempt = attempt + 1, "recovered after retry");
                }
                return Ok(v);
            }
            Err(e) if attempt < retries => {
                let delay = base * 2u32.saturating_pow(attempt);
                let jitter = {
                    let mut rng = rand::thread_rng();
                    delay.mul_f64(rng.gen_range(0.0..0.1))
                };
                warn!(
                    what,
                    attempt = attempt + 1,
                    error = %e,
                    delay_ms = (delay + jitter).as_millis() as u64,
                    "transient failure; backing off"
                );
                tokio::time::sleep(delay + jitter).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
