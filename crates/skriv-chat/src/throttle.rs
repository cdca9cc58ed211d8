// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Global token bucket.
///
/// Refill is continuous and fractional: a bucket with rate 30/s that was
/// drained 10 ms ago already holds 0.3 tokens.  `acquire` suspends until a
/// whole token is available; the wait is an ordinary `tokio::time::sleep`,
/// so cancelling the calling future abandons the wait without consuming
/// anything.
pub struct Throttle {
    state: Mutex<BucketState>,
    /// tokens per second
    rate: f64,
    capacity: f64,
}

impl Throttle {
    /// `rate` tokens per second with a burst capacity of one second's worth.
    pub fn new(rate: f64) -> Self {
        Self::with_capacity(rate, rate)
    }

    pub fn with_capacity(rate: f64, capacity: f64) -> Self {
        Self {
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            rate,
            capacity,
        }
    }

    /// Take one token, suspending until the bucket refills if necessary.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut st = self.state.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(st.last_refill).as_secs_f64();
                st.tokens = (st.tokens + elapsed * self.rate).min(self.capacity);
                st.last_refill = now;
                if st.tokens >= 1.0 {
                    st.tokens -= 1.0;
                    return;
                }
                // Sleep exactly until one whole token has accrued.
                Duration::from_secs_f64((1.0 - st.tokens) / self.rate)
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Tokens currently available (for diagnostics and tests).
    pub async fn available(&self) -> f64 {
        let mut st = self.state.lock().await;
        let now = Instant::now();
        let elapsed = now.duration_since(st.last_refill).as_secs_f64();
        st.tokens = (st.tokens + elapsed * self.rate).min(self.capacity);
        st.last_refill = now;
        st.tokens
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn burst_up_to_capacity_is_immediate() {
        let t = Throttle::new(30.0);
        let start = Instant::now();
        for _ in 0..30 {
            t.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn drained_bucket_waits_for_refill() {
        let t = Throttle::new(10.0);
        for _ in 0..10 {
            t.acquire().await;
        }
        let start = Instant::now();
        t.acquire().await;
        // One token at 10/s takes 100ms to accrue.
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn refill_is_fractional() {
        let t = Throttle::new(10.0);
        for _ in 0..10 {
            t.acquire().await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        // Half a token accrued in 50ms at 10/s.
        let avail = t.available().await;
        assert!((avail - 0.5).abs() < 1e-6, "available = {avail}");
    }

    #[tokio::test(start_paused = true)]
    async fn n_calls_over_capacity_take_expected_wall_clock() {
        // 120 sends at 30/s with a 30-token burst: the last 90 refill at
        // 30/s, so completion takes at least 3 seconds.
        let t = Throttle::new(30.0);
        let start = Instant::now();
        for _ in 0..120 {
            t.acquire().await;
        }
        assert!(start.elapsed() >= Duration::from_secs(3));
    }
}
