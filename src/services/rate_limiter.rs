//! Per-API-key sliding-window rate limiter
//!
//! Each key owns a log of admission instants. A request is admitted while fewer
//! than `max_requests` admissions fall inside the trailing window.
//!
//! The in-process store only sees requests handled by this instance. Deployments
//! running several instances need a shared implementation of [`RateLimitStore`].

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::RateLimitConfig;

/// Outcome of a limiter check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Unix time (seconds) at which the next slot frees up
    pub reset: u64,
    /// Seconds until a denied caller may retry, rounded up
    pub retry_after: Option<u64>,
}

/// Storage backend for the webhook limiter
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Record a hit for `key` if it is admitted
    async fn check(&self, key: &str) -> RateLimitDecision;

    /// Drop state for idle keys; returns how many were evicted
    async fn sweep(&self) -> usize;

    /// Number of keys currently holding state
    async fn tracked_keys(&self) -> usize;
}

#[derive(Debug, Default)]
struct Window {
    hits: VecDeque<Instant>,
}

impl Window {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.hits.front() {
            if now.duration_since(oldest) >= window {
                self.hits.pop_front();
            } else {
                break;
            }
        }
    }
}

/// In-process sliding-window log
pub struct SlidingWindowLimiter {
    max_requests: u32,
    window: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl SlidingWindowLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, config.window())
    }

    fn decision(&self, allowed: bool, hits: usize, until_free: Duration) -> RateLimitDecision {
        let remaining = self.max_requests.saturating_sub(hits as u32);
        RateLimitDecision {
            allowed,
            limit: self.max_requests,
            remaining,
            reset: unix_secs_after(until_free),
            retry_after: (!allowed).then(|| ceil_secs(until_free)),
        }
    }
}

#[async_trait]
impl RateLimitStore for SlidingWindowLimiter {
    async fn check(&self, key: &str) -> RateLimitDecision {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let entry = windows.entry(key.to_string()).or_default();
        entry.prune(now, self.window);

        if entry.hits.len() >= self.max_requests as usize {
            let until_free = entry
                .hits
                .front()
                .map(|&oldest| (oldest + self.window).saturating_duration_since(now))
                .unwrap_or(self.window);
            return self.decision(false, entry.hits.len(), until_free);
        }

        entry.hits.push_back(now);
        let until_free = entry
            .hits
            .front()
            .map(|&oldest| (oldest + self.window).saturating_duration_since(now))
            .unwrap_or(self.window);
        self.decision(true, entry.hits.len(), until_free)
    }

    async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, w| {
            w.hits
                .back()
                .is_some_and(|&last| now.duration_since(last) < self.window)
        });
        before - windows.len()
    }

    async fn tracked_keys(&self) -> usize {
        self.windows.lock().await.len()
    }
}

fn ceil_secs(d: Duration) -> u64 {
    let secs = d.as_millis().div_ceil(1000) as u64;
    secs.max(1)
}

fn unix_secs_after(d: Duration) -> u64 {
    let now_ms = Utc::now().timestamp_millis().max(0) as u64;
    (now_ms + d.as_millis() as u64).div_ceil(1000)
}
