// ABOUTME: Route organization for the TableChat HTTP API
// ABOUTME: Holds the shared AppState and assembles the full router
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 TableChat Contributors

/// Saved chart routes
pub mod charts;
/// Chat completion routes (single-shot and streaming)
pub mod chat;
/// File upload and inspection routes
pub mod files;
/// Health check routes
pub mod health;
/// Session CRUD routes
pub mod sessions;

pub use charts::ChartRoutes;
pub use chat::ChatRoutes;
pub use files::FileRoutes;
pub use health::HealthRoutes;
pub use sessions::SessionRoutes;

use crate::cache::TieredCache;
use crate::config::ServerConfig;
use crate::middleware::{rate_limit_middleware, RateLimiter};
use crate::services::{ChatOrchestrator, SessionStore, TableService};
use axum::extract::DefaultBodyLimit;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Maximum accepted upload size (32 MiB)
const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Shared state handed to every route handler
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    /// Database handle
    pub db: crate::database::Database,
    /// Tiered cache
    pub cache: Arc<TieredCache>,
    /// Table access service
    pub tables: Arc<TableService>,
    /// Session store
    pub sessions: Arc<SessionStore>,
    /// Chat orchestrator
    pub chat: Arc<ChatOrchestrator>,
}

/// Assemble the complete application router
pub fn router(state: Arc<AppState>) -> Router {
    let upload_limiter = RateLimiter::new(state.config.upload_rate_limit);
    let stream_limiter = RateLimiter::new(state.config.chat_stream_rate_limit);

    Router::new()
        .merge(HealthRoutes::routes(state.clone()))
        .merge(FileRoutes::routes(state.clone(), &upload_limiter))
        .merge(SessionRoutes::routes(state.clone()))
        .merge(ChatRoutes::routes(state.clone(), &stream_limiter))
        .merge(ChartRoutes::routes(state))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Wrap a router in a rate limiting layer
pub(crate) fn with_rate_limit(router: Router, limiter: &RateLimiter) -> Router {
    router.layer(axum::middleware::from_fn_with_state(
        limiter.clone(),
        rate_limit_middleware,
    ))
}
