// ABOUTME: Chat endpoints: single-shot completion and SSE streaming
// ABOUTME: Streaming responses carry chunk/done/error events as JSON data frames
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 TableChat Contributors

use super::{with_rate_limit, AppState};
use crate::errors::AppResult;
use crate::middleware::RateLimiter;
use crate::models::StoredMessage;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::post;
use axum::{Json, Router};
use futures_util::stream::Stream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;

/// Request body for both chat endpoints
#[derive(Debug, Deserialize)]
pub struct ChatRequestBody {
    /// Session to converse in
    pub session_id: String,
    /// User message
    pub message: String,
    /// Dataset keys overriding the session's attached keys for this request
    pub file_ids: Option<Vec<String>>,
}

/// Response for the single-shot endpoint
#[derive(Debug, Serialize)]
pub struct ChatResponseBody {
    /// Session the reply belongs to
    pub session_id: String,
    /// Persisted assistant message, chart included when one was extracted
    pub message: StoredMessage,
}

/// Chat route handlers
pub struct ChatRoutes;

impl ChatRoutes {
    /// Create the chat routes; streaming sits behind the rate limiter
    pub fn routes(state: Arc<AppState>, stream_limiter: &RateLimiter) -> Router {
        let stream = with_rate_limit(
            Router::new()
                .route("/api/chat/stream", post(Self::send_message_stream))
                .with_state(state.clone()),
            stream_limiter,
        );

        stream.merge(
            Router::new()
                .route("/api/chat", post(Self::send_message))
                .with_state(state),
        )
    }

    /// `POST /api/chat`
    async fn send_message(
        State(state): State<Arc<AppState>>,
        Json(request): Json<ChatRequestBody>,
    ) -> AppResult<Json<ChatResponseBody>> {
        let (message, _chart_config) = state
            .chat
            .send_message(
                &request.session_id,
                &request.message,
                request.file_ids.as_deref(),
            )
            .await?;

        Ok(Json(ChatResponseBody {
            session_id: request.session_id,
            message,
        }))
    }

    /// `POST /api/chat/stream`
    ///
    /// SSE body: zero or more `chunk` events, closed by exactly one `done`
    /// or `error` event.
    async fn send_message_stream(
        State(state): State<Arc<AppState>>,
        Json(request): Json<ChatRequestBody>,
    ) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
        let events = state
            .chat
            .stream_message(
                &request.session_id,
                &request.message,
                request.file_ids.as_deref(),
            )
            .await?;

        let stream = events.map(|event| {
            let data = serde_json::to_string(&event)
                .unwrap_or_else(|_| r#"{"type":"error","message":"serialization failed"}"#.to_owned());
            Ok(Event::default().data(data))
        });

        Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
    }
}
