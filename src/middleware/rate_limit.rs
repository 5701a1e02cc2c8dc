// ABOUTME: Fixed-window per-IP rate limiting for upload and streaming routes
// ABOUTME: Emits X-RateLimit-* headers on every decision
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 TableChat Contributors

use crate::config::RateLimit;
use crate::errors::AppError;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::debug;

/// HTTP header names for rate limiting
pub mod headers {
    /// Maximum requests allowed in the current window
    pub const X_RATE_LIMIT_LIMIT: &str = "X-RateLimit-Limit";
    /// Remaining requests in the current window
    pub const X_RATE_LIMIT_REMAINING: &str = "X-RateLimit-Remaining";
    /// Seconds until the current window resets
    pub const X_RATE_LIMIT_RESET: &str = "X-RateLimit-Reset";
    /// Retry-after duration in seconds
    pub const RETRY_AFTER: &str = "Retry-After";
}

/// Per-client window state
#[derive(Debug, Clone, Copy)]
struct WindowState {
    window_start: Instant,
    count: u32,
}

/// Fixed-window rate limiter keyed by client IP
#[derive(Clone)]
pub struct RateLimiter {
    limit: RateLimit,
    windows: Arc<DashMap<String, WindowState>>,
    last_sweep: Arc<Mutex<Instant>>,
}

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Remaining requests in the current window
    pub remaining: u32,
    /// Seconds until the window resets
    pub reset_secs: u64,
}

impl RateLimiter {
    #[must_use]
    pub fn new(limit: RateLimit) -> Self {
        Self {
            limit,
            windows: Arc::new(DashMap::new()),
            last_sweep: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Record a request for `client` and decide whether it may proceed
    pub fn check(&self, client: &str) -> RateLimitDecision {
        let now = Instant::now();
        let window_secs = self.limit.window_secs;
        self.sweep_expired(now);

        let mut entry = self
            .windows
            .entry(client.to_owned())
            .or_insert(WindowState {
                window_start: now,
                count: 0,
            });

        let elapsed = now.duration_since(entry.window_start).as_secs();
        if elapsed >= window_secs {
            entry.window_start = now;
            entry.count = 0;
        }

        let reset_secs = window_secs.saturating_sub(now.duration_since(entry.window_start).as_secs());

        if entry.count >= self.limit.limit {
            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_secs,
            };
        }

        entry.count += 1;
        RateLimitDecision {
            allowed: true,
            remaining: self.limit.limit - entry.count,
            reset_secs,
        }
    }

    /// Drop windows a full window old, at most once per window length.
    ///
    /// Must not run while an entry guard is held; the retain would contend
    /// on the same shard.
    fn sweep_expired(&self, now: Instant) {
        let window_secs = self.limit.window_secs;
        {
            let Ok(mut last) = self.last_sweep.lock() else {
                return;
            };
            if now.duration_since(*last).as_secs() < window_secs {
                return;
            }
            *last = now;
        }
        self.windows
            .retain(|_, window| now.duration_since(window.window_start).as_secs() < window_secs);
    }

    const fn limit(&self) -> RateLimit {
        self.limit
    }

    #[cfg(test)]
    fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

/// Build the response headers for a rate limit decision
fn rate_limit_headers(limit: u32, decision: RateLimitDecision) -> HeaderMap {
    let mut map = HeaderMap::new();
    if let Ok(v) = HeaderValue::from_str(&limit.to_string()) {
        map.insert(headers::X_RATE_LIMIT_LIMIT, v);
    }
    if let Ok(v) = HeaderValue::from_str(&decision.remaining.to_string()) {
        map.insert(headers::X_RATE_LIMIT_REMAINING, v);
    }
    if let Ok(v) = HeaderValue::from_str(&decision.reset_secs.to_string()) {
        map.insert(headers::X_RATE_LIMIT_RESET, v);
        if !decision.allowed {
            if let Ok(v) = HeaderValue::from_str(&decision.reset_secs.to_string()) {
                map.insert(headers::RETRY_AFTER, v);
            }
        }
    }
    map
}

/// Axum middleware enforcing a [`RateLimiter`] on the wrapped routes
pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let client = addr.ip().to_string();
    let decision = limiter.check(&client);
    let limit = limiter.limit();
    let header_map = rate_limit_headers(limit.limit, decision);

    if !decision.allowed {
        debug!("Rate limit exceeded for {}", client);
        let mut response =
            AppError::rate_limit_exceeded(limit.limit, limit.window_secs).into_response();
        response.headers_mut().extend(header_map);
        return response;
    }

    let mut response = next.run(request).await;
    response.headers_mut().extend(header_map);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(limit: u32, window_secs: u64) -> RateLimiter {
        RateLimiter::new(RateLimit { limit, window_secs })
    }

    #[test]
    fn allows_up_to_limit_then_rejects() {
        let limiter = limiter(3, 60);
        for expected_remaining in [2, 1, 0] {
            let decision = limiter.check("1.2.3.4");
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }
        let decision = limiter.check("1.2.3.4");
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
    }

    #[test]
    fn clients_are_tracked_separately() {
        let limiter = limiter(1, 60);
        assert!(limiter.check("1.1.1.1").allowed);
        assert!(limiter.check("2.2.2.2").allowed);
        assert!(!limiter.check("1.1.1.1").allowed);
    }

    #[test]
    fn expired_windows_are_swept() {
        // A zero-length window expires every entry immediately, so each
        // check evicts all prior clients
        let limiter = limiter(5, 0);
        limiter.check("1.1.1.1");
        limiter.check("2.2.2.2");
        limiter.check("3.3.3.3");
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn live_windows_survive_the_sweep() {
        let limiter = limiter(5, 60);
        limiter.check("1.1.1.1");
        limiter.check("2.2.2.2");
        assert_eq!(limiter.tracked_clients(), 2);
    }
}
