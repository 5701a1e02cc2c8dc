// ABOUTME: Database operations for chat sessions and their messages
// ABOUTME: Handles CRUD, pagination with title search, and message history
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 TableChat Contributors

use super::files::parse_timestamp;
use crate::errors::{AppError, AppResult};
use crate::models::{ChatSession, FileMetadata, SessionDetail, SessionPage, StoredMessage};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Title given to a session before the first user message arrives
pub const DEFAULT_SESSION_TITLE: &str = "New conversation";

/// Chat session database operations
pub struct SessionManager {
    pool: SqlitePool,
}

impl SessionManager {
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new session with the given dataset keys
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn create(
        &self,
        title: Option<&str>,
        dataset_keys: &[String],
        file_metadata: &[FileMetadata],
    ) -> AppResult<ChatSession> {
        let id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now();
        let title = title.unwrap_or(DEFAULT_SESSION_TITLE);
        let keys_json = serde_json::to_string(dataset_keys)?;
        let metadata_json = serde_json::to_string(file_metadata)?;

        sqlx::query(
            r"
            INSERT INTO chat_sessions (id, title, dataset_keys, file_metadata, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            ",
        )
        .bind(&id)
        .bind(title)
        .bind(&keys_json)
        .bind(&metadata_json)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to create session: {e}")))?;

        Ok(ChatSession {
            id,
            title: title.to_owned(),
            dataset_keys: dataset_keys.to_vec(),
            file_metadata: file_metadata.to_vec(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Get a session by id, without messages
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn get(&self, session_id: &str) -> AppResult<Option<ChatSession>> {
        let row = sqlx::query(
            r"
            SELECT id, title, dataset_keys, file_metadata, created_at, updated_at
            FROM chat_sessions
            WHERE id = $1
            ",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to get session: {e}")))?;

        row.map(Self::row_to_session).transpose()
    }

    /// Get a session together with its full message history
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn get_with_messages(&self, session_id: &str) -> AppResult<Option<SessionDetail>> {
        let Some(session) = self.get(session_id).await? else {
            return Ok(None);
        };

        let rows = sqlx::query(
            r"
            SELECT id, session_id, role, content, chart_config, thinking, created_at
            FROM chat_messages
            WHERE session_id = $1
            ORDER BY id ASC
            ",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to get session messages: {e}")))?;

        let messages = rows
            .into_iter()
            .map(Self::row_to_message)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(Some(SessionDetail { session, messages }))
    }

    /// List sessions, newest first, with optional case-insensitive title search
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn list_paginated(
        &self,
        page: u32,
        limit: u32,
        search: Option<&str>,
    ) -> AppResult<SessionPage> {
        let offset = i64::from(page.saturating_sub(1)) * i64::from(limit);
        let search_filter = search
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s.to_lowercase()));

        let (total, rows) = if let Some(filter) = &search_filter {
            let total: i64 = sqlx::query(
                "SELECT COUNT(*) as count FROM chat_sessions WHERE LOWER(title) LIKE $1",
            )
            .bind(filter)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to count sessions: {e}")))?
            .get("count");

            let rows = sqlx::query(
                r"
                SELECT id, title, dataset_keys, file_metadata, created_at, updated_at
                FROM chat_sessions
                WHERE LOWER(title) LIKE $1
                ORDER BY updated_at DESC
                LIMIT $2 OFFSET $3
                ",
            )
            .bind(filter)
            .bind(i64::from(limit))
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to list sessions: {e}")))?;

            (total, rows)
        } else {
            let total: i64 = sqlx::query("SELECT COUNT(*) as count FROM chat_sessions")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| AppError::database(format!("Failed to count sessions: {e}")))?
                .get("count");

            let rows = sqlx::query(
                r"
                SELECT id, title, dataset_keys, file_metadata, created_at, updated_at
                FROM chat_sessions
                ORDER BY updated_at DESC
                LIMIT $1 OFFSET $2
                ",
            )
            .bind(i64::from(limit))
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to list sessions: {e}")))?;

            (total, rows)
        };

        let sessions = rows
            .into_iter()
            .map(Self::row_to_session)
            .collect::<AppResult<Vec<_>>>()?;

        let has_more = i64::from(page) * i64::from(limit) < total;
        Ok(SessionPage {
            sessions,
            total,
            page,
            limit,
            has_more,
        })
    }

    /// Delete a session and its messages (cascade)
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn delete(&self, session_id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM chat_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to delete session: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete all sessions, returning how many were removed
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn delete_all(&self) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM chat_sessions")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to delete sessions: {e}")))?;

        Ok(result.rows_affected())
    }

    /// Append a message and bump the session's updated_at
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn add_message(
        &self,
        session_id: &str,
        role: &str,
        content: &str,
        chart_config: Option<&serde_json::Value>,
        thinking: Option<&str>,
    ) -> AppResult<StoredMessage> {
        let now = chrono::Utc::now();
        let chart_json = chart_config.map(serde_json::Value::to_string);

        let result = sqlx::query(
            r"
            INSERT INTO chat_messages (session_id, role, content, chart_config, thinking, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(session_id)
        .bind(role)
        .bind(content)
        .bind(&chart_json)
        .bind(thinking)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to add message: {e}")))?;

        sqlx::query("UPDATE chat_sessions SET updated_at = $1 WHERE id = $2")
            .bind(now.to_rfc3339())
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to touch session: {e}")))?;

        Ok(StoredMessage {
            id: result.last_insert_rowid(),
            session_id: session_id.to_owned(),
            role: role.to_owned(),
            content: content.to_owned(),
            chart_config: chart_config.cloned(),
            thinking: thinking.map(ToOwned::to_owned),
            created_at: now,
        })
    }

    /// Rename a session
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn update_title(&self, session_id: &str, title: &str) -> AppResult<bool> {
        let now = chrono::Utc::now().to_rfc3339();

        let result = sqlx::query(
            r"
            UPDATE chat_sessions
            SET title = $1, updated_at = $2
            WHERE id = $3
            ",
        )
        .bind(title)
        .bind(&now)
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to update session title: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    /// Replace the session's dataset keys
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the database operation fails
    pub async fn update_dataset_keys(
        &self,
        session_id: &str,
        dataset_keys: &[String],
    ) -> AppResult<bool> {
        let now = chrono::Utc::now().to_rfc3339();
        let keys_json = serde_json::to_string(dataset_keys)?;

        let result = sqlx::query(
            r"
            UPDATE chat_sessions
            SET dataset_keys = $1, updated_at = $2
            WHERE id = $3
            ",
        )
        .bind(&keys_json)
        .bind(&now)
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to update dataset keys: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    /// Replace the session's file attachment metadata
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the database operation fails
    pub async fn update_file_metadata(
        &self,
        session_id: &str,
        file_metadata: &[FileMetadata],
    ) -> AppResult<bool> {
        let now = chrono::Utc::now().to_rfc3339();
        let metadata_json = serde_json::to_string(file_metadata)?;

        let result = sqlx::query(
            r"
            UPDATE chat_sessions
            SET file_metadata = $1, updated_at = $2
            WHERE id = $3
            ",
        )
        .bind(&metadata_json)
        .bind(&now)
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to update file metadata: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    fn row_to_session(row: sqlx::sqlite::SqliteRow) -> AppResult<ChatSession> {
        let dataset_keys: Vec<String> = serde_json::from_str(row.get("dataset_keys"))?;
        let file_metadata: Vec<FileMetadata> = serde_json::from_str(row.get("file_metadata"))?;
        let created_at: String = row.get("created_at");
        let updated_at: String = row.get("updated_at");

        Ok(ChatSession {
            id: row.get("id"),
            title: row.get("title"),
            dataset_keys,
            file_metadata,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
        })
    }

    fn row_to_message(row: sqlx::sqlite::SqliteRow) -> AppResult<StoredMessage> {
        let chart_config: Option<String> = row.get("chart_config");
        let chart_config = chart_config
            .map(|raw| serde_json::from_str(&raw))
            .transpose()?;
        let created_at: String = row.get("created_at");

        Ok(StoredMessage {
            id: row.get("id"),
            session_id: row.get("session_id"),
            role: row.get("role"),
            content: row.get("content"),
            chart_config,
            thinking: row.get("thinking"),
            created_at: parse_timestamp(&created_at)?,
        })
    }
}
