// ABOUTME: Session CRUD endpoints
// ABOUTME: Thin handlers over the cache-coherent SessionStore
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 TableChat Contributors

use super::AppState;
use crate::errors::{AppError, AppResult};
use crate::models::{ChatSession, FileMetadata, SessionDetail, SessionPage};
use axum::extract::{Path, Query, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Request body for creating a session
#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    /// Initial title, defaults to a placeholder until the first message
    pub title: Option<String>,
    /// Dataset keys attached to the conversation
    #[serde(default)]
    pub dataset_keys: Vec<String>,
    /// Attachment metadata for the referenced files
    #[serde(default)]
    pub file_metadata: Vec<FileMetadata>,
}

/// Query parameters for listing sessions
#[derive(Debug, Deserialize)]
pub struct ListSessionsQuery {
    /// Page number, 1-based
    #[serde(default = "default_page")]
    pub page: u32,
    /// Page size
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Case-insensitive title filter
    pub search: Option<String>,
}

const fn default_page() -> u32 {
    1
}

const fn default_limit() -> u32 {
    20
}

/// Request body for renaming a session
#[derive(Debug, Deserialize)]
pub struct UpdateTitleRequest {
    /// New title
    pub title: String,
}

/// Request body for replacing the session's dataset keys
#[derive(Debug, Deserialize)]
pub struct UpdateDatasetKeysRequest {
    /// New dataset keys
    pub dataset_keys: Vec<String>,
}

/// Request body for replacing the session's attachment metadata
#[derive(Debug, Deserialize)]
pub struct UpdateFileMetadataRequest {
    /// New attachment metadata
    pub file_metadata: Vec<FileMetadata>,
}

/// Response for bulk deletion
#[derive(Debug, Serialize)]
pub struct DeleteAllResponse {
    /// Number of sessions removed
    pub deleted: u64,
}

/// Session route handlers
pub struct SessionRoutes;

impl SessionRoutes {
    /// Create the session routes
    pub fn routes(state: Arc<AppState>) -> Router {
        Router::new()
            .route(
                "/api/sessions",
                get(Self::list).post(Self::create).delete(Self::delete_all),
            )
            .route(
                "/api/sessions/:session_id",
                get(Self::detail).delete(Self::delete),
            )
            .route("/api/sessions/:session_id/title", put(Self::update_title))
            .route(
                "/api/sessions/:session_id/dataset-keys",
                put(Self::update_dataset_keys),
            )
            .route(
                "/api/sessions/:session_id/file-metadata",
                put(Self::update_file_metadata),
            )
            .with_state(state)
    }

    /// `POST /api/sessions`
    async fn create(
        State(state): State<Arc<AppState>>,
        Json(request): Json<CreateSessionRequest>,
    ) -> AppResult<Json<ChatSession>> {
        let session = state
            .sessions
            .create(
                request.title.as_deref(),
                &request.dataset_keys,
                &request.file_metadata,
            )
            .await?;
        Ok(Json(session))
    }

    /// `GET /api/sessions`
    async fn list(
        State(state): State<Arc<AppState>>,
        Query(query): Query<ListSessionsQuery>,
    ) -> AppResult<Json<SessionPage>> {
        if query.limit == 0 || query.limit > 100 {
            return Err(AppError::invalid_input("limit must be between 1 and 100"));
        }
        let listing = state
            .sessions
            .list(query.page, query.limit, query.search.as_deref())
            .await?;
        Ok(Json(listing))
    }

    /// `GET /api/sessions/{session_id}`
    async fn detail(
        State(state): State<Arc<AppState>>,
        Path(session_id): Path<String>,
    ) -> AppResult<Json<SessionDetail>> {
        let detail = state
            .sessions
            .get_detail(&session_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Session '{session_id}'")))?;
        Ok(Json(detail))
    }

    /// `DELETE /api/sessions/{session_id}`
    async fn delete(
        State(state): State<Arc<AppState>>,
        Path(session_id): Path<String>,
    ) -> AppResult<Json<serde_json::Value>> {
        if !state.sessions.delete(&session_id).await? {
            return Err(AppError::not_found(format!("Session '{session_id}'")));
        }
        Ok(Json(serde_json::json!({ "deleted": true })))
    }

    /// `DELETE /api/sessions`
    async fn delete_all(
        State(state): State<Arc<AppState>>,
    ) -> AppResult<Json<DeleteAllResponse>> {
        let deleted = state.sessions.delete_all().await?;
        Ok(Json(DeleteAllResponse { deleted }))
    }

    /// `PUT /api/sessions/{session_id}/title`
    async fn update_title(
        State(state): State<Arc<AppState>>,
        Path(session_id): Path<String>,
        Json(request): Json<UpdateTitleRequest>,
    ) -> AppResult<Json<serde_json::Value>> {
        if request.title.trim().is_empty() {
            return Err(AppError::invalid_input("Title must not be empty"));
        }
        if !state
            .sessions
            .update_title(&session_id, request.title.trim())
            .await?
        {
            return Err(AppError::not_found(format!("Session '{session_id}'")));
        }
        Ok(Json(serde_json::json!({ "updated": true })))
    }

    /// `PUT /api/sessions/{session_id}/dataset-keys`
    async fn update_dataset_keys(
        State(state): State<Arc<AppState>>,
        Path(session_id): Path<String>,
        Json(request): Json<UpdateDatasetKeysRequest>,
    ) -> AppResult<Json<serde_json::Value>> {
        if !state
            .sessions
            .update_dataset_keys(&session_id, &request.dataset_keys)
            .await?
        {
            return Err(AppError::not_found(format!("Session '{session_id}'")));
        }
        Ok(Json(serde_json::json!({ "updated": true })))
    }

    /// `PUT /api/sessions/{session_id}/file-metadata`
    async fn update_file_metadata(
        State(state): State<Arc<AppState>>,
        Path(session_id): Path<String>,
        Json(request): Json<UpdateFileMetadataRequest>,
    ) -> AppResult<Json<serde_json::Value>> {
        state.tables.validate_metadata(&request.file_metadata).await?;
        if !state
            .sessions
            .update_file_metadata(&session_id, &request.file_metadata)
            .await?
        {
            return Err(AppError::not_found(format!("Session '{session_id}'")));
        }
        Ok(Json(serde_json::json!({ "updated": true })))
    }
}
