// ABOUTME: Health check endpoint reporting database and cache tier status
// ABOUTME: Degraded cache mode is reported, never treated as failure
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 TableChat Contributors

use super::AppState;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;

/// Health report payload
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall status: "ok" or "degraded"
    pub status: &'static str,
    /// Whether the database answered a probe query
    pub database_healthy: bool,
    /// Cache mode: "redis" or "local"
    pub cache: &'static str,
    /// Whether the active cache tier passed its health check
    pub cache_healthy: bool,
}

/// Health route handlers
pub struct HealthRoutes;

impl HealthRoutes {
    /// Create the health routes
    pub fn routes(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/api/health", get(Self::health))
            .with_state(state)
    }

    /// `GET /api/health`
    async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
        let database_healthy = sqlx::query("SELECT 1")
            .execute(state.db.pool())
            .await
            .is_ok();
        let cache_healthy = state.cache.health_check().await.is_ok();

        Json(HealthResponse {
            status: if database_healthy && cache_healthy {
                "ok"
            } else {
                "degraded"
            },
            database_healthy,
            cache: if state.cache.has_redis() {
                "redis"
            } else {
                "local"
            },
            cache_healthy,
        })
    }
}
