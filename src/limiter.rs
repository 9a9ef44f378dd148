use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Sliding-window rate limiter protecting the external classifier.
///
/// `acquire` suspends the calling task until a call slot is available; it
/// never fails. The check-and-record step is one critical section, so
/// concurrent callers can never jointly exceed the window limit. Waiting
/// callers queue on the mutex; a woken caller re-checks rather than
/// assuming its slot survived, so the bound holds even when several tasks
/// wake for one freed slot.
pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            max_calls,
            window,
            calls: Mutex::new(VecDeque::with_capacity(max_calls)),
        }
    }

    /// Block until a call slot is available, then claim it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut calls = self.calls.lock().await;
                let now = Instant::now();
                while let Some(&front) = calls.front() {
                    if now.duration_since(front) >= self.window {
                        calls.pop_front();
                    } else {
                        break;
                    }
                }

                if calls.len() < self.max_calls {
                    calls.push_back(now);
                    return;
                }

                // Full window: sleep until the oldest recorded call ages out.
                let oldest = *calls.front().expect("non-empty when at capacity");
                oldest + self.window - now
            };

            tracing::debug!(wait_ms = wait.as_millis() as u64, "rate limiter saturated");
            tokio::time::sleep(wait).await;
        }
    }

    /// Call slots currently recorded inside the trailing window.
    pub async fn in_flight(&self) -> usize {
        let mut calls = self.calls.lock().await;
        let now = Instant::now();
        while let Some(&front) = calls.front() {
            if now.duration_since(front) >= self.window {
                calls.pop_front();
            } else {
                break;
            }
        }
        calls.len()
    }
}
