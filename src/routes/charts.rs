// ABOUTME: Saved chart endpoints
// ABOUTME: Lists extracted charts and clears them from their messages
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 TableChat Contributors

use super::AppState;
use crate::database::ChartManager;
use crate::errors::{AppError, AppResult};
use crate::models::ChartPage;
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;

/// Query parameters for listing charts
#[derive(Debug, Deserialize)]
pub struct ListChartsQuery {
    /// Page number, 1-based
    #[serde(default = "default_page")]
    pub page: u32,
    /// Page size
    #[serde(default = "default_limit")]
    pub limit: u32,
}

const fn default_page() -> u32 {
    1
}

const fn default_limit() -> u32 {
    20
}

/// Chart route handlers
pub struct ChartRoutes;

impl ChartRoutes {
    /// Create the chart routes
    pub fn routes(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/api/charts", get(Self::list))
            .route("/api/charts/:message_id", axum::routing::delete(Self::delete))
            .with_state(state)
    }

    /// `GET /api/charts`
    async fn list(
        State(state): State<Arc<AppState>>,
        Query(query): Query<ListChartsQuery>,
    ) -> AppResult<Json<ChartPage>> {
        if query.limit == 0 || query.limit > 100 {
            return Err(AppError::invalid_input("limit must be between 1 and 100"));
        }
        let charts = ChartManager::new(state.db.pool().clone())
            .list(query.page, query.limit)
            .await?;
        Ok(Json(charts))
    }

    /// `DELETE /api/charts/{message_id}`
    ///
    /// Clears the chart from the message; the message itself survives.
    async fn delete(
        State(state): State<Arc<AppState>>,
        Path(message_id): Path<i64>,
    ) -> AppResult<Json<serde_json::Value>> {
        let session_id = ChartManager::new(state.db.pool().clone())
            .clear_chart(message_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Chart on message {message_id}")))?;

        // The cached session detail still carries the chart
        state.sessions.invalidate_detail(&session_id).await;

        Ok(Json(serde_json::json!({ "deleted": true })))
    }
}
