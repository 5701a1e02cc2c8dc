// ABOUTME: Chat orchestration: prompt assembly, completion, streaming, persistence
// ABOUTME: Streamed replies are accumulated and persisted only on clean completion
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 TableChat Contributors

use crate::database::sessions::DEFAULT_SESSION_TITLE;
use crate::errors::{AppError, AppResult};
use crate::llm::{prompts, ChatMessage, ChatRequest, LlmProvider};
use crate::models::{DatasetKey, SessionDetail, StoredMessage, Table};
use crate::services::charts::extract_chart_config;
use crate::services::sessions::SessionStore;
use crate::services::tables::TableService;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Titles derive from the first user message, truncated to this many chars
const TITLE_MAX_CHARS: usize = 50;

/// One event in a streamed chat response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChatStreamEvent {
    /// A content fragment
    Chunk {
        /// Text delta
        content: String,
    },
    /// Stream finished cleanly; the reply has been persisted
    Done {
        /// Chart extracted from the full reply, if any
        chart_config: Option<serde_json::Value>,
    },
    /// Stream failed; nothing was persisted
    Error {
        /// Human-readable failure description
        message: String,
    },
}

/// Chat orchestrator tying the model provider to tables and session storage
pub struct ChatOrchestrator {
    provider: Arc<dyn LlmProvider>,
    tables: Arc<TableService>,
    sessions: Arc<SessionStore>,
    /// Caps concurrently open model streams; single-shot requests are not gated
    stream_permits: Arc<Semaphore>,
}

impl ChatOrchestrator {
    #[must_use]
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tables: Arc<TableService>,
        sessions: Arc<SessionStore>,
        stream_concurrency: usize,
    ) -> Self {
        Self {
            provider,
            tables,
            sessions,
            stream_permits: Arc::new(Semaphore::new(stream_concurrency)),
        }
    }

    /// Answer a user message without streaming.
    ///
    /// Persists the user message, completes, extracts any chart, persists the
    /// assistant reply, and derives the session title on the first exchange.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for an unknown session, or the provider's
    /// error when the completion fails. A failed completion leaves the user
    /// message persisted and the session title untouched.
    pub async fn send_message(
        &self,
        session_id: &str,
        user_message: &str,
        file_ids: Option<&[String]>,
    ) -> AppResult<(StoredMessage, Option<serde_json::Value>)> {
        let detail = self
            .sessions
            .get_detail(session_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Session '{session_id}'")))?;

        let dataset_keys = self
            .effective_dataset_keys(session_id, &detail, file_ids)
            .await?;
        let llm_messages = self
            .build_llm_messages(&detail, &dataset_keys, user_message)
            .await;

        let first_turn =
            detail.messages.is_empty() && detail.session.title == DEFAULT_SESSION_TITLE;
        self.sessions
            .add_message(session_id, "user", user_message, None, None)
            .await?;

        let request = ChatRequest::new(llm_messages);
        let response = self.provider.complete(&request).await?;

        let chart_config = extract_chart_config(&response.content);
        let stored = self
            .sessions
            .add_message(
                session_id,
                "assistant",
                &response.content,
                chart_config.as_ref(),
                None,
            )
            .await?;

        // Title only on a completed first exchange
        if first_turn {
            self.derive_title(session_id, user_message).await;
        }

        Ok((stored, chart_config))
    }

    /// Answer a user message as a stream of [`ChatStreamEvent`]s.
    ///
    /// The full reply is accumulated while chunks are forwarded; on clean
    /// completion it is persisted with any extracted chart and a `Done` event
    /// closes the stream. A mid-stream failure yields one `Error` event and
    /// persists nothing. A concurrency permit is held for the stream's whole
    /// lifetime; dropping the stream releases it.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for an unknown session. Provider errors
    /// after this point arrive as `Error` events inside the stream.
    pub async fn stream_message(
        &self,
        session_id: &str,
        user_message: &str,
        file_ids: Option<&[String]>,
    ) -> AppResult<impl Stream<Item = ChatStreamEvent>> {
        let detail = self
            .sessions
            .get_detail(session_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Session '{session_id}'")))?;

        let dataset_keys = self
            .effective_dataset_keys(session_id, &detail, file_ids)
            .await?;
        let llm_messages = self
            .build_llm_messages(&detail, &dataset_keys, user_message)
            .await;

        let first_turn =
            detail.messages.is_empty() && detail.session.title == DEFAULT_SESSION_TITLE;
        self.sessions
            .add_message(session_id, "user", user_message, None, None)
            .await?;

        let permit = self
            .stream_permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| AppError::internal(format!("Stream semaphore closed: {e}")))?;

        let provider = Arc::clone(&self.provider);
        let sessions = Arc::clone(&self.sessions);
        let session_id = session_id.to_owned();
        let derived_title = first_turn.then(|| truncate_title(user_message));

        let stream = async_stream::stream! {
            // Held until the stream is dropped or finishes
            let _permit = permit;

            let request = ChatRequest::new(llm_messages).with_streaming();
            let mut upstream = match provider.complete_stream(&request).await {
                Ok(upstream) => upstream,
                Err(e) => {
                    yield ChatStreamEvent::Error { message: e.to_string() };
                    return;
                }
            };

            let mut full_response = String::new();

            while let Some(chunk) = upstream.next().await {
                match chunk {
                    Ok(chunk) => {
                        if !chunk.delta.is_empty() {
                            full_response.push_str(&chunk.delta);
                            yield ChatStreamEvent::Chunk { content: chunk.delta };
                        }
                        if chunk.is_final {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Stream failed mid-response for session {}: {}", session_id, e);
                        yield ChatStreamEvent::Error { message: e.to_string() };
                        return;
                    }
                }
            }

            let chart_config = extract_chart_config(&full_response);

            match sessions
                .add_message(&session_id, "assistant", &full_response, chart_config.as_ref(), None)
                .await
            {
                Ok(_) => {
                    // Title only on a completed first exchange
                    if let Some(title) = derived_title {
                        if let Err(e) = sessions.update_title(&session_id, &title).await {
                            warn!("Failed to set title for session {}: {}", session_id, e);
                        }
                    }
                    yield ChatStreamEvent::Done { chart_config };
                }
                Err(e) => {
                    warn!("Failed to persist streamed reply for session {}: {}", session_id, e);
                    yield ChatStreamEvent::Error { message: e.to_string() };
                }
            }
        };

        Ok(stream)
    }

    /// Dataset keys for this request: the per-request override when given,
    /// the session's attached keys otherwise. A differing override also
    /// replaces the session's stored keys. An empty override counts as
    /// absent, never as a detach.
    async fn effective_dataset_keys(
        &self,
        session_id: &str,
        detail: &SessionDetail,
        file_ids: Option<&[String]>,
    ) -> AppResult<Vec<String>> {
        match file_ids {
            Some(keys) if !keys.is_empty() => {
                if keys != detail.session.dataset_keys.as_slice() {
                    self.sessions.update_dataset_keys(session_id, keys).await?;
                }
                Ok(keys.to_vec())
            }
            _ => Ok(detail.session.dataset_keys.clone()),
        }
    }

    /// Assemble the prompt: system instructions, data context, history, and
    /// the new user message.
    async fn build_llm_messages(
        &self,
        detail: &SessionDetail,
        dataset_keys: &[String],
        user_message: &str,
    ) -> Vec<ChatMessage> {
        let tables = self.resolve_datasets(dataset_keys, detail).await;

        let mut system = prompts::CHART_SYSTEM_PROMPT.to_owned();
        match tables.len() {
            0 => {}
            1 => {
                let (name, table) = &tables[0];
                system.push('\n');
                system.push_str(&prompts::single_table_context(name, table));
            }
            _ => {
                let refs: Vec<(String, &Table)> =
                    tables.iter().map(|(n, t)| (n.clone(), t)).collect();
                system.push('\n');
                system.push_str(&prompts::multi_table_context(&refs));
            }
        }

        let mut messages = vec![ChatMessage::system(system)];
        for msg in &detail.messages {
            match msg.role.as_str() {
                "user" => messages.push(ChatMessage::user(&msg.content)),
                "assistant" => messages.push(ChatMessage::assistant(&msg.content)),
                other => debug!("Skipping message with unknown role '{}'", other),
            }
        }
        messages.push(ChatMessage::user(user_message));

        messages
    }

    /// Resolve the session's dataset keys to tables.
    ///
    /// Unresolvable datasets are skipped with a warning so one missing file
    /// never blocks the conversation.
    async fn resolve_datasets(
        &self,
        dataset_keys: &[String],
        detail: &SessionDetail,
    ) -> Vec<(String, Table)> {
        let mut tables = Vec::with_capacity(dataset_keys.len());

        for raw_key in dataset_keys {
            let key = DatasetKey::parse(raw_key);

            let table = match self.tables.get_table(&key).await {
                Ok(table) => table,
                Err(e) => {
                    warn!("Skipping dataset '{}': {}", raw_key, e);
                    continue;
                }
            };

            let filename = match detail
                .session
                .file_metadata
                .iter()
                .find(|m| m.file_id == key.file_id)
            {
                Some(metadata) => metadata.filename.clone(),
                None => match self.tables.get_file(&key.file_id).await {
                    Ok(Some(file)) => file.filename,
                    _ => key.file_id.clone(),
                },
            };

            tables.push((key.display_name(&filename), table));
        }

        tables
    }

    /// Set the session title from its first user message
    async fn derive_title(&self, session_id: &str, user_message: &str) {
        let title = truncate_title(user_message);
        if let Err(e) = self.sessions.update_title(session_id, &title).await {
            warn!("Failed to set title for session {}: {}", session_id, e);
        }
    }
}

/// First `TITLE_MAX_CHARS` characters of the message, with a `...` suffix
/// when truncated. Counts chars, not bytes.
#[must_use]
pub fn truncate_title(message: &str) -> String {
    let mut title: String = message.chars().take(TITLE_MAX_CHARS).collect();
    if message.chars().count() > TITLE_MAX_CHARS {
        title.push_str("...");
    }
    title
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_title_is_unchanged() {
        let message = "Show me the revenue by month";
        assert_eq!(truncate_title(message), message);
    }

    #[test]
    fn long_title_is_truncated_with_ellipsis() {
        let message = "a".repeat(60);
        let title = truncate_title(&message);
        assert_eq!(title.chars().count(), 53);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn exactly_fifty_chars_is_not_truncated() {
        let message = "b".repeat(50);
        assert_eq!(truncate_title(&message), message);
    }

    #[test]
    fn truncation_counts_chars_not_bytes() {
        let message = "é".repeat(60);
        let title = truncate_title(&message);
        assert_eq!(title.chars().count(), 53);
    }

    #[test]
    fn stream_events_serialize_with_type_tag() {
        let chunk = serde_json::to_value(ChatStreamEvent::Chunk {
            content: "hi".into(),
        })
        .unwrap();
        assert_eq!(chunk["type"], "chunk");
        assert_eq!(chunk["content"], "hi");

        let done = serde_json::to_value(ChatStreamEvent::Done { chart_config: None }).unwrap();
        assert_eq!(done["type"], "done");
        assert!(done["chart_config"].is_null());

        let err = serde_json::to_value(ChatStreamEvent::Error {
            message: "boom".into(),
        })
        .unwrap();
        assert_eq!(err["type"], "error");
    }
}
