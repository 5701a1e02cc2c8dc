// ABOUTME: Database operations for charts extracted from assistant messages
// ABOUTME: Saved charts are message rows with a non-null chart_config column
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 TableChat Contributors

use super::files::parse_timestamp;
use crate::errors::{AppError, AppResult};
use crate::models::{ChartPage, SavedChart};
use sqlx::{Row, SqlitePool};

/// Saved chart database operations
pub struct ChartManager {
    pool: SqlitePool,
}

impl ChartManager {
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// List saved charts, newest first, joined with their session titles
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn list(&self, page: u32, limit: u32) -> AppResult<ChartPage> {
        let offset = i64::from(page.saturating_sub(1)) * i64::from(limit);

        let total: i64 = sqlx::query(
            r"
            SELECT COUNT(*) as count
            FROM chat_messages
            WHERE chart_config IS NOT NULL AND role = 'assistant'
            ",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to count charts: {e}")))?
        .get("count");

        let rows = sqlx::query(
            r"
            SELECT m.id, m.session_id, m.chart_config, m.created_at, s.title as session_title
            FROM chat_messages m
            JOIN chat_sessions s ON s.id = m.session_id
            WHERE m.chart_config IS NOT NULL AND m.role = 'assistant'
            ORDER BY m.created_at DESC
            LIMIT $1 OFFSET $2
            ",
        )
        .bind(i64::from(limit))
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to list charts: {e}")))?;

        let charts = rows
            .into_iter()
            .map(|row| {
                let raw: String = row.get("chart_config");
                let chart_config = serde_json::from_str(&raw)?;
                let created_at: String = row.get("created_at");

                Ok(SavedChart {
                    message_id: row.get("id"),
                    session_id: row.get("session_id"),
                    session_title: row.get("session_title"),
                    chart_config,
                    created_at: parse_timestamp(&created_at)?,
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(ChartPage {
            charts,
            total,
            page,
            limit,
        })
    }

    /// Remove the chart from a message, keeping the message itself.
    ///
    /// Returns the owning session id when a chart was cleared, `None` when
    /// the message had no chart or does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn clear_chart(&self, message_id: i64) -> AppResult<Option<String>> {
        let row = sqlx::query(
            r"
            SELECT session_id
            FROM chat_messages
            WHERE id = $1 AND chart_config IS NOT NULL
            ",
        )
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to look up chart message: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let session_id: String = row.get("session_id");

        sqlx::query("UPDATE chat_messages SET chart_config = NULL WHERE id = $1")
            .bind(message_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to clear chart: {e}")))?;

        Ok(Some(session_id))
    }
}
