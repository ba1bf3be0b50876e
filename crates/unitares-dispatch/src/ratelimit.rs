//! Step 4 of the pipeline: per-identity rate limiting and per-tool loop
//! short-circuit (spec.md §4.11 "non-read-only tools pass through a
//! token-bucket or sliding-window limiter keyed by identity... per-tool call
//! histories trigger a loop short-circuit when more than N (~20) calls of the
//! same tool occur within a short window").

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::error::{DispatchError, DispatchResult};

pub const DEFAULT_LOOP_THRESHOLD: u32 = 20;
pub const DEFAULT_LOOP_WINDOW_SECS: i64 = 60;
pub const DEFAULT_BUCKET_CAPACITY: f64 = 30.0;
pub const DEFAULT_REFILL_PER_SEC: f64 = 0.5;

struct Bucket {
    tokens: f64,
    last_refill: DateTime<Utc>,
}

/// Token bucket keyed by identity, plus a bounded per-`(identity, tool)` call
/// history used for loop short-circuit detection.
pub struct RateLimiter {
    buckets: DashMap<String, Bucket>,
    histories: DashMap<(String, String), VecDeque<DateTime<Utc>>>,
    capacity: f64,
    refill_per_sec: f64,
    loop_threshold: u32,
    loop_window: Duration,
}

impl RateLimiter {
    pub fn new(capacity: f64, refill_per_sec: f64, loop_threshold: u32, loop_window_secs: i64) -> Self {
        Self {
            buckets: DashMap::new(),
            histories: DashMap::new(),
            capacity,
            refill_per_sec,
            loop_threshold,
            loop_window: Duration::seconds(loop_window_secs),
        }
    }

    /// Checks and consumes one token for `identity`, then records this call in
    /// `(identity, tool)`'s history and checks the loop short-circuit.
    pub fn check(&self, identity: &str, tool: &str, now: DateTime<Utc>) -> DispatchResult<()> {
        self.check_bucket(identity, tool, now)?;
        self.check_loop(identity, tool, now)
    }

    fn check_bucket(&self, identity: &str, tool: &str, now: DateTime<Utc>) -> DispatchResult<()> {
        let mut bucket = self.buckets.entry(identity.to_string()).or_insert_with(|| Bucket { tokens: self.capacity, last_refill: now });
        let elapsed = (now - bucket.last_refill).num_milliseconds().max(0) as f64 / 1000.0;
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens < 1.0 {
            return Err(DispatchError::RateLimited { tool: tool.to_string() });
        }
        bucket.tokens -= 1.0;
        Ok(())
    }

    fn check_loop(&self, identity: &str, tool: &str, now: DateTime<Utc>) -> DispatchResult<()> {
        let key = (identity.to_string(), tool.to_string());
        let mut history = self.histories.entry(key).or_insert_with(VecDeque::new);
        let cutoff = now - self.loop_window;
        while history.front().is_some_and(|t| *t < cutoff) {
            history.pop_front();
        }
        history.push_back(now);

        if history.len() as u32 > self.loop_threshold {
            return Err(DispatchError::LoopShortCircuit { tool: tool.to_string(), count: history.len() as u32 });
        }
        Ok(())
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_BUCKET_CAPACITY, DEFAULT_REFILL_PER_SEC, DEFAULT_LOOP_THRESHOLD, DEFAULT_LOOP_WINDOW_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_allows_up_to_capacity_then_rejects() {
        let limiter = RateLimiter::new(3.0, 0.0, 100, 60);
        let now = Utc::now();
        for _ in 0..3 {
            limiter.check("agent-1", "tool-a", now).unwrap();
        }
        let result = limiter.check("agent-1", "tool-a", now);
        assert!(matches!(result, Err(DispatchError::RateLimited { .. })));
    }

    #[test]
    fn bucket_refills_over_time() {
        let limiter = RateLimiter::new(1.0, 1.0, 100, 60);
        let now = Utc::now();
        limiter.check("agent-1", "tool-a", now).unwrap();
        assert!(limiter.check("agent-1", "tool-a", now).is_err());
        assert!(limiter.check("agent-1", "tool-a", now + Duration::seconds(2)).is_ok());
    }

    #[test]
    fn loop_short_circuit_fires_past_threshold_within_window() {
        let limiter = RateLimiter::new(1000.0, 1000.0, 3, 60);
        let now = Utc::now();
        for _ in 0..3 {
            limiter.check("agent-1", "tool-a", now).unwrap();
        }
        let result = limiter.check("agent-1", "tool-a", now);
        assert!(matches!(result, Err(DispatchError::LoopShortCircuit { .. })));
    }

    #[test]
    fn loop_history_outside_window_does_not_count() {
        let limiter = RateLimiter::new(1000.0, 1000.0, 2, 60);
        let now = Utc::now();
        limiter.check("agent-1", "tool-a", now).unwrap();
        limiter.check("agent-1", "tool-a", now).unwrap();
        let later = now + Duration::seconds(120);
        assert!(limiter.check("agent-1", "tool-a", later).is_ok());
    }
}
