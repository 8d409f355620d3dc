use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Sliding-window admission control keyed by submitter identifier.
///
/// Advisory only: it absorbs double clicks and repeated submissions from one
/// process, and anyone restarting the process gets a fresh window. Access
/// control on the backend remains the authority.
#[derive(Debug)]
pub struct RateLimiter {
    attempts: Mutex<HashMap<String, Vec<Instant>>>,
    max_attempts: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_attempts: usize, window: Duration) -> Self {
        Self {
            attempts: Mutex::new(HashMap::new()),
            max_attempts,
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Returns `true` and records the attempt when `key` is under its limit.
    pub fn check_rate_limit(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    /// Same as [`check_rate_limit`](Self::check_rate_limit) against an explicit clock.
    pub fn check_at(&self, key: &str, now: Instant) -> bool {
        let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        let entry = attempts.entry(key.to_string()).or_default();
        let window = self.window;
        entry.retain(|t| now.saturating_duration_since(*t) < window);

        if entry.len() >= self.max_attempts {
            log::debug!(
                "Rate limit hit for {key}: {} attempts in the last {}s",
                entry.len(),
                window.as_secs()
            );
            return false;
        }

        entry.push(now);
        true
    }

    /// Number of recorded attempts currently stored for `key`.
    pub fn recorded(&self, key: &str) -> usize {
        let attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        attempts.get(key).map(Vec::len).unwrap_or(0)
    }

    /// Oldest stored timestamp for `key`, if any.
    pub fn oldest(&self, key: &str) -> Option<Instant> {
        let attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        attempts.get(key).and_then(|entries| entries.first().copied())
    }

    /// Drop keys whose every attempt has left the window.
    pub fn purge_expired(&self, now: Instant) {
        let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        let window = self.window;
        attempts.retain(|_, entries| {
            entries.retain(|t| now.saturating_duration_since(*t) < window);
            !entries.is_empty()
        });
    }
}
