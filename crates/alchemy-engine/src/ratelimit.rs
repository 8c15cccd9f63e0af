//! Fixed-window request counters per caller.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::EngineError;

/// Which counter a request draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    /// `combine` requests.
    Combine,
    /// Model-heavy path generation.
    Generate,
}

struct Window {
    started: Instant,
    used: u32,
}

pub struct RateLimiter {
    limit: u32,
    window: Duration,
    callers: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    /// `limit` of zero disables the limiter.
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            callers: Mutex::new(HashMap::new()),
        }
    }

    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    pub fn check(&self, caller: &str) -> Result<(), EngineError> {
        self.check_at(caller, Instant::now())
    }

    pub fn check_at(&self, caller: &str, now: Instant) -> Result<(), EngineError> {
        if self.limit == 0 {
            return Ok(());
        }
        let mut callers = self.callers.lock().unwrap_or_else(|e| e.into_inner());
        // Drop stale windows so idle callers do not accumulate.
        if callers.len() > 10_000 {
            let window = self.window;
            callers.retain(|_, w| now.saturating_duration_since(w.started) < window);
        }
        let entry = callers.entry(caller.to_string()).or_insert(Window {
            started: now,
            used: 0,
        });
        let elapsed = now.saturating_duration_since(entry.started);
        if elapsed >= self.window {
            entry.started = now;
            entry.used = 0;
        }
        if entry.used >= self.limit {
            let remaining = self.window.saturating_sub(elapsed);
            let retry_after = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
            return Err(EngineError::RateLimited {
                retry_after: retry_after.max(1),
            });
        }
        entry.used += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_then_reject() {
        let limiter = RateLimiter::per_minute(2);
        let t0 = Instant::now();
        assert!(limiter.check_at("alice", t0).is_ok());
        assert!(limiter.check_at("alice", t0).is_ok());
        let err = limiter
            .check_at("alice", t0 + Duration::from_secs(20))
            .unwrap_err();
        assert_eq!(err, EngineError::RateLimited { retry_after: 40 });
    }

    #[test]
    fn test_callers_are_independent() {
        let limiter = RateLimiter::per_minute(1);
        let t0 = Instant::now();
        assert!(limiter.check_at("alice", t0).is_ok());
        assert!(limiter.check_at("bob", t0).is_ok());
        assert!(limiter.check_at("alice", t0).is_err());
    }

    #[test]
    fn test_window_resets() {
        let limiter = RateLimiter::per_minute(1);
        let t0 = Instant::now();
        assert!(limiter.check_at("alice", t0).is_ok());
        assert!(limiter.check_at("alice", t0 + Duration::from_secs(61)).is_ok());
    }

    #[test]
    fn test_zero_disables() {
        let limiter = RateLimiter::per_minute(0);
        for _ in 0..100 {
            assert!(limiter.check("alice").is_ok());
        }
    }
}
