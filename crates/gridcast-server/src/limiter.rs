//! Per-identity rolling-window rate limiting.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Tracks request counts per user identity over a rolling window.
///
/// Keyed strictly by identity, never by connection: a second connection
/// under the same identity draws from the same budget. The check and the
/// consumption happen under one lock, so two concurrent callers can never
/// both pass on the last slot of a window.
pub struct RateLimiter {
    window: Duration,
    max_requests: usize,
    buckets: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    /// Create a limiter allowing `max_requests` per `window`.
    pub fn new(window: Duration, max_requests: usize) -> Self {
        Self {
            window,
            max_requests,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Whether another request is permitted for `uid` right now; a
    /// permitted request is recorded as consumed. Rejected requests do not
    /// consume budget.
    pub fn allow(&self, uid: &str) -> bool {
        self.allow_at(uid, Instant::now())
    }

    fn allow_at(&self, uid: &str, now: Instant) -> bool {
        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(uid.to_owned()).or_default();
        while let Some(front) = bucket.front() {
            if now.duration_since(*front) >= self.window {
                let _ = bucket.pop_front();
            } else {
                break;
            }
        }
        if bucket.len() < self.max_requests {
            bucket.push_back(now);
            true
        } else {
            false
        }
    }

    /// Drop buckets whose newest request fell out of the window. Returns
    /// the number of identities evicted.
    pub fn prune_idle(&self) -> usize {
        self.prune_idle_at(Instant::now())
    }

    fn prune_idle_at(&self, now: Instant) -> usize {
        let mut buckets = self.buckets.lock();
        let before = buckets.len();
        buckets.retain(|_, bucket| {
            bucket
                .back()
                .is_some_and(|last| now.duration_since(*last) < self.window)
        });
        before - buckets.len()
    }

    /// Number of identities currently holding window state.
    pub fn tracked_identities(&self) -> usize {
        self.buckets.lock().len()
    }

    /// The warning sent to clients that exceed the limit.
    pub fn warning_message(&self) -> String {
        format!(
            "Requests limit of {} per {}s exceeded",
            self.max_requests,
            self.window.as_secs()
        )
    }
}

/// Periodically evict idle identity buckets until cancelled.
pub async fn run_sweeper(limiter: Arc<RateLimiter>, interval: Duration, cancel: CancellationToken) {
    let mut tick = tokio::time::interval(interval);
    // Skip the immediate first tick
    let _ = tick.tick().await;
    loop {
        tokio::select! {
            _ = tick.tick() => {
                let evicted = limiter.prune_idle();
                if evicted > 0 {
                    debug!(evicted, "evicted idle rate-limit buckets");
                }
            }
            () = cancel.cancelled() => return,
        }
    }
}
