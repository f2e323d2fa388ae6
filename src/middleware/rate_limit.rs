//! Rate limiting middleware
//!
//! Credential endpoints (login, forgot-password) are limited per
//! `{method, path, client ip, email}` with a keyed governor limiter, so one
//! attacker cannot lock a victim out from another address. Webhook traffic is
//! limited per API key inside the webhook pipeline; both share the header format
//! defined here.

use std::{num::NonZeroU32, sync::Arc, time::Duration};

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use governor::{
    clock::{Clock, DefaultClock},
    middleware::StateInformationMiddleware,
    state::keyed::DefaultKeyedStateStore,
    Quota, RateLimiter,
};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{
    config::RateLimitConfig,
    services::{RateLimitDecision, RateLimitStore},
    utils::{client_ip, AppError},
    AppState,
};

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";

type KeyedLimiter =
    RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock, StateInformationMiddleware>;

/// Keyed GCRA limiter: a burst of `max_attempts`, refilled evenly over the window
pub struct CredentialLimiter {
    limiter: KeyedLimiter,
    clock: DefaultClock,
    max_attempts: u32,
    replenish: Duration,
}

impl CredentialLimiter {
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        let burst = NonZeroU32::new(max_attempts).unwrap_or(NonZeroU32::MIN);
        let replenish = window / burst.get();
        let quota = Quota::with_period(replenish)
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst);

        Self {
            limiter: RateLimiter::keyed(quota).with_middleware::<StateInformationMiddleware>(),
            clock: DefaultClock::default(),
            max_attempts: burst.get(),
            replenish,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.auth_max_attempts, config.auth_window())
    }

    pub fn check(&self, key: &str) -> RateLimitDecision {
        match self.limiter.check_key(&key.to_string()) {
            Ok(snapshot) => {
                let remaining = snapshot.remaining_burst_capacity();
                let used = self.max_attempts.saturating_sub(remaining);
                RateLimitDecision {
                    allowed: true,
                    limit: self.max_attempts,
                    remaining,
                    reset: unix_secs_after(self.replenish * used),
                    retry_after: None,
                }
            }
            Err(not_until) => {
                let wait = not_until.wait_time_from(self.clock.now());
                RateLimitDecision {
                    allowed: false,
                    limit: self.max_attempts,
                    remaining: 0,
                    reset: unix_secs_after(wait),
                    retry_after: Some(wait.as_millis().div_ceil(1000).max(1) as u64),
                }
            }
        }
    }

    /// Forget keys whose state has fully replenished
    pub fn retain_recent(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    pub fn tracked_keys(&self) -> usize {
        self.limiter.len()
    }
}

fn unix_secs_after(d: Duration) -> u64 {
    let now_ms = Utc::now().timestamp_millis().max(0) as u64;
    (now_ms + d.as_millis() as u64).div_ceil(1000)
}

/// Attach `X-RateLimit-*` headers for a decision
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert(LIMIT_HEADER, HeaderValue::from(decision.limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(decision.remaining));
    headers.insert(RESET_HEADER, HeaderValue::from(decision.reset));
}

/// 429 response carrying `Retry-After`, `retryAfter` and the limit headers
pub fn rate_limited_response(decision: &RateLimitDecision) -> Response {
    let mut response = AppError::TooManyRequests {
        retry_after: decision.retry_after.unwrap_or(1),
    }
    .into_response();
    apply_rate_limit_headers(response.headers_mut(), decision);
    response
}

/// Lowercased `email` field of a JSON body, if any
fn body_email(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value
        .get("email")
        .and_then(|e| e.as_str())
        .map(|e| e.trim().to_lowercase())
}

/// Rate limiting middleware for credential endpoints
pub async fn credential_rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, state.config.server.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(_) => return AppError::bad_request("Request body too large").into_response(),
    };

    let ip = client_ip(
        &parts.headers,
        &parts.extensions,
        &state.config.server.trusted_proxies,
    );
    let email = body_email(&bytes).unwrap_or_default();
    let key = format!("{}|{}|{}|{}", parts.method, parts.uri.path(), ip, email);

    let decision = state.credential_limiter.check(&key);
    if !decision.allowed {
        warn!(ip = %ip, path = %parts.uri.path(), "Credential rate limit exceeded");
        return rate_limited_response(&decision);
    }
    debug!(ip = %ip, remaining = decision.remaining, "Credential rate limit check passed");

    let request = Request::from_parts(parts, Body::from(bytes));
    let mut response = next.run(request).await;
    apply_rate_limit_headers(response.headers_mut(), &decision);
    response
}

/// Spawn a background task that periodically evicts idle limiter state
pub fn spawn_rate_limit_cleanup(
    store: Arc<dyn RateLimitStore>,
    credential: Arc<CredentialLimiter>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let evicted = store.sweep().await;
            credential.retain_recent();
            debug!(
                evicted,
                credential_keys = credential.tracked_keys(),
                "Rate limiter cleanup completed"
            );
        }
    })
}
