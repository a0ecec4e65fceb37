//! Fixed-window request rate limiting for crawl fetches.
//!
//! A budget of N requests per window; the N+1th caller in a window
//! sleeps out the remainder rather than being dropped. Bursts at
//! window boundaries are a known, accepted imprecision of the
//! fixed-window shape (this is not a token bucket).
//!
//! The limiter is owned by a single operation invocation — it is
//! constructed per crawl and never shared across concurrent
//! operations, so it needs no interior locking.

use std::time::Duration;

use tokio::time::Instant;

pub struct FixedWindowLimiter {
    budget: u32,
    window: Duration,
    window_start: Instant,
    used: u32,
}

impl FixedWindowLimiter {
    pub fn new(budget: u32, window: Duration) -> Self {
        Self {
            budget: budget.max(1),
            window,
            window_start: Instant::now(),
            used: 0,
        }
    }

    /// Limiter with a per-minute budget, the shape crawl config uses.
    pub fn per_minute(budget: u32) -> Self {
        Self::new(budget, Duration::from_secs(60))
    }

    /// Take one slot, sleeping until the next window when the current
    /// one is exhausted. Never rejects.
    pub async fn acquire(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.window_start);

        if elapsed >= self.window {
            self.window_start = now;
            self.used = 0;
        } else if self.used >= self.budget {
            let remaining = self.window - elapsed;
            tracing::debug!(wait_ms = remaining.as_millis() as u64, "rate limit window exhausted");
            tokio::time::sleep(remaining).await;
            self.window_start = Instant::now();
            self.used = 0;
        }

        self.used += 1;
    }
}
