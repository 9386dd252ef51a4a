use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{sleep_until, Instant};
use tracing::trace;

/// Allows at most `limit` dispatches inside any sliding window of `window`.
///
/// Waiters are served in arrival order.
pub struct BurstLimiter {
    limit: usize,
    window: Duration,
    dispatched: AsyncMutex<VecDeque<Instant>>,
}

impl BurstLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        let limit = limit.max(1);
        Self {
            limit,
            window,
            dispatched: AsyncMutex::new(VecDeque::with_capacity(limit)),
        }
    }

    /// Waits until one more dispatch fits in the window, then claims it.
    pub async fn acquire(&self) {
        let mut dispatched = self.dispatched.lock().await;
        loop {
            let now = Instant::now();
            while dispatched
                .front()
                .is_some_and(|oldest| now.duration_since(*oldest) >= self.window)
            {
                dispatched.pop_front();
            }
            if dispatched.len() < self.limit {
                dispatched.push_back(now);
                return;
            }
            if let Some(oldest) = dispatched.front().copied() {
                trace!(limit = self.limit, "burst allowance used; waiting for window to slide");
                sleep_until(oldest + self.window).await;
            }
        }
    }
}
