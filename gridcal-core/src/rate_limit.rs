//! Sliding-window rate limiting for surface calls.
//!
//! The external API publishes a 60-requests-per-minute ceiling; the
//! default quota stays well under it. Every call path into the surface
//! goes through [`RateLimiter::wait_if_needed`]; no request bypasses
//! the gate. The window lock is never held across the sleep, so a
//! blocked caller does not stall unrelated bookkeeping.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::debug;

/// Default quota, leaving safety margin under the published 60/min.
pub const DEFAULT_QUOTA_PER_MINUTE: usize = 55;

const WINDOW: Duration = Duration::from_secs(60);
/// Small slack past the oldest stamp's window exit.
const WAIT_MARGIN: Duration = Duration::from_millis(500);

#[derive(Default)]
struct WindowState {
    stamps: VecDeque<Instant>,
    total_calls: u64,
    total_wait: Duration,
    max_wait: Duration,
}

impl WindowState {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.stamps.front() {
            if now.duration_since(oldest) > window {
                self.stamps.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Cumulative usage counters, for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterStats {
    pub total_calls: u64,
    pub in_window: usize,
    pub total_wait: Duration,
    pub max_wait: Duration,
}

pub struct RateLimiter {
    quota: usize,
    window: Duration,
    state: Mutex<WindowState>,
}

impl RateLimiter {
    pub fn new(quota_per_minute: usize) -> Self {
        RateLimiter {
            quota: quota_per_minute.max(1),
            window: WINDOW,
            state: Mutex::new(WindowState::default()),
        }
    }

    pub fn quota(&self) -> usize {
        self.quota
    }

    /// Block until the window has capacity, then record the call.
    ///
    /// Callers must not hold other locks across this await; in the
    /// worst case it sleeps for most of the window.
    pub async fn wait_if_needed(&self) {
        loop {
            let wait = {
                let mut state = self.lock();
                let now = Instant::now();
                state.prune(now, self.window);

                if state.stamps.len() < self.quota {
                    state.stamps.push_back(now);
                    state.total_calls += 1;
                    return;
                }

                // Window is full: wait until the oldest stamp exits.
                let oldest = *state.stamps.front().expect("window is full");
                let wait = self
                    .window
                    .checked_sub(now.duration_since(oldest))
                    .unwrap_or_default()
                    + WAIT_MARGIN;
                state.total_wait += wait;
                state.max_wait = state.max_wait.max(wait);
                wait
            };

            debug!(wait_secs = wait.as_secs_f64(), "rate limit reached, waiting");
            sleep(wait).await;
        }
    }

    pub fn stats(&self) -> RateLimiterStats {
        let mut state = self.lock();
        state.prune(Instant::now(), self.window);
        RateLimiterStats {
            total_calls: state.total_calls,
            in_window: state.stamps.len(),
            total_wait: state.total_wait,
            max_wait: state.max_wait,
        }
    }

    /// Clear the window and counters (testing hook).
    pub fn reset(&self) {
        let mut state = self.lock();
        *state = WindowState::default();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, WindowState> {
        self.state.lock().expect("rate limiter lock poisoned")
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        RateLimiter::new(DEFAULT_QUOTA_PER_MINUTE)
    }
}
