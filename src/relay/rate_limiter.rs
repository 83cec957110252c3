// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Per-client fixed-window rate limiter for relayed requests

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

// Table growth bound before stale windows are swept
const PRUNE_THRESHOLD: usize = 1024;

struct Bucket {
    window_start: Instant,
    count: u32,
}

/// Fixed-window counter keyed by client identity
///
/// One bucket per (identity, window). Stale windows are pruned while the
/// write lock is held, keeping the table bounded.
pub struct RateLimiter {
    buckets: RwLock<HashMap<String, Bucket>>,
    max_per_window: u32,
    window: Duration,
}

impl RateLimiter {
    /// Create a rate limiter with a default 60-second window
    pub fn new(max_per_window: u32) -> Self {
        Self::with_window(max_per_window, Duration::from_secs(60))
    }

    /// Create a rate limiter with a custom window duration
    pub fn with_window(max_per_window: u32, window: Duration) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            max_per_window,
            window,
        }
    }

    /// Record one request for the identity and report whether it is allowed
    ///
    /// A request over the limit is counted as rejected, not recorded; the
    /// window keeps its position so the client cannot extend it by retrying.
    pub fn check_and_record(&self, identity: &str) -> bool {
        let now = Instant::now();
        let mut buckets = self.buckets.write().unwrap();

        if buckets.len() > PRUNE_THRESHOLD {
            let window = self.window;
            buckets.retain(|_, b| now.duration_since(b.window_start) < window);
        }

        let bucket = buckets.entry(identity.to_string()).or_insert(Bucket {
            window_start: now,
            count: 0,
        });

        if now.duration_since(bucket.window_start) >= self.window {
            bucket.window_start = now;
            bucket.count = 0;
        }

        if bucket.count >= self.max_per_window {
            return false;
        }
        bucket.count += 1;
        true
    }

    /// Number of tracked identities (current and stale windows)
    pub fn tracked_identities(&self) -> usize {
        self.buckets.read().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_of_one_allows_exactly_one() {
        let limiter = RateLimiter::new(1);

        assert!(limiter.check_and_record("client-a"));
        assert!(!limiter.check_and_record("client-a"));
    }

    #[test]
    fn test_identities_are_independent() {
        let limiter = RateLimiter::new(1);

        assert!(limiter.check_and_record("client-a"));
        assert!(limiter.check_and_record("client-b"));
        assert!(!limiter.check_and_record("client-a"));
    }

    #[test]
    fn test_window_resets() {
        let limiter = RateLimiter::with_window(1, Duration::from_millis(20));

        assert!(limiter.check_and_record("client-a"));
        assert!(!limiter.check_and_record("client-a"));

        std::thread::sleep(Duration::from_millis(30));
        assert!(limiter.check_and_record("client-a"));
    }

    #[test]
    fn test_rejected_requests_do_not_consume_budget() {
        let limiter = RateLimiter::new(2);

        assert!(limiter.check_and_record("client-a"));
        assert!(limiter.check_and_record("client-a"));
        // Rejections beyond the limit never free up the window early
        for _ in 0..10 {
            assert!(!limiter.check_and_record("client-a"));
        }
    }
}
