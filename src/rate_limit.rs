//! In-memory sliding-window rate limiting.
//!
//! DESIGN
//! ======
//! Each limiter keeps `HashMap<String, VecDeque<Instant>>` of accepted
//! request timestamps per key. Two instances run in the service:
//! - Global: `RATE_LIMIT_REQUESTS_PER_MINUTE` requests per client per 60s
//! - Login: `LOGIN_RATE_LIMIT` attempts per client IP per `LOGIN_RATE_WINDOW_SECS`
//!
//! TRADE-OFFS
//! ==========
//! State is per-process. Running several replicas multiplies the effective
//! budget; the login lockout counter in Postgres is the durable backstop.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Keys are swept once the map grows past this many entries.
const SWEEP_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: usize },
    Limited { retry_after_secs: u64 },
}

impl RateDecision {
    #[cfg(test)]
    fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

// =============================================================================
// RATE LIMITER
// =============================================================================

#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
    limit: usize,
    window: Duration,
}

impl RateLimiter {
    #[must_use]
    pub fn new(limit: usize, window: Duration) -> Self {
        Self { inner: Arc::new(Mutex::new(HashMap::new())), limit, window }
    }

    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Check the key's window and record the attempt when it is allowed.
    pub fn check_and_record(&self, key: &str) -> RateDecision {
        self.check_and_record_at(key, Instant::now())
    }

    pub(crate) fn check_and_record_at(&self, key: &str, now: Instant) -> RateDecision {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        if inner.len() > SWEEP_THRESHOLD {
            let window = self.window;
            inner.retain(|_, deque| {
                prune_window(deque, now, window);
                !deque.is_empty()
            });
        }

        let deque = inner.entry(key.to_owned()).or_default();
        prune_window(deque, now, self.window);

        if deque.len() >= self.limit {
            let retry_after = deque
                .front()
                .map_or(self.window, |&oldest| self.window.saturating_sub(now.duration_since(oldest)));
            return RateDecision::Limited { retry_after_secs: ceil_secs(retry_after) };
        }

        deque.push_back(now);
        RateDecision::Allowed { remaining: self.limit - deque.len() }
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn prune_window(deque: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&front) = deque.front() {
        if now.duration_since(front) >= window {
            deque.pop_front();
        } else {
            break;
        }
    }
}

/// Whole seconds, rounded up, never below one.
fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs() + u64::from(duration.subsec_nanos() > 0);
    secs.max(1)
}

#[cfg(test)]
#[path = "rate_limit_test.rs"]
mod tests;
