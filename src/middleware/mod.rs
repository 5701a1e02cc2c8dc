// ABOUTME: HTTP middleware for the server
// ABOUTME: Currently holds the per-route rate limiter
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 TableChat Contributors

/// Fixed-window rate limiting
pub mod rate_limit;

pub use rate_limit::{rate_limit_middleware, RateLimiter};
