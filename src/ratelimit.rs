//! Fixed-window request rate limiting, keyed by client IP or by the
//! username claimed in the auth header.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub(crate) struct RateLimiter {
    window: Duration,
    limit: u32,
    buckets: Mutex<HashMap<String, Bucket>>,
}

struct Bucket {
    window_start: Instant,
    count: u32,
}

impl RateLimiter {
    pub fn new(window: Duration, limit: u32) -> RateLimiter {
        RateLimiter {
            window,
            limit,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Record one request for `key`; false when over the limit.
    pub fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut buckets = self.buckets.lock();

        // Expired windows accumulate one bucket per key; sweep them when
        // the map grows past a screenful.
        if buckets.len() > 1024 {
            let window = self.window;
            buckets.retain(|_, b| now.duration_since(b.window_start) < window);
        }

        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            window_start: now,
            count: 0,
        });
        if now.duration_since(bucket.window_start) >= self.window {
            bucket.window_start = now;
            bucket.count = 0;
        }
        bucket.count += 1;
        bucket.count <= self.limit
    }
}
