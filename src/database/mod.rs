// ABOUTME: SQLite database layer: connection pool management and schema migration
// ABOUTME: Submodules hold the per-domain managers (files, sessions, charts)
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 TableChat Contributors

/// Saved chart operations
pub mod charts;
/// Uploaded file storage operations
pub mod files;
/// Chat session and message operations
pub mod sessions;

use crate::errors::{AppError, AppResult};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::info;

pub use charts::ChartManager;
pub use files::FileManager;
pub use sessions::SessionManager;

/// Database handle wrapping the shared connection pool
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open the database and run migrations.
    ///
    /// SQLite URLs get `?mode=rwc` appended so the database file is created
    /// on first run.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be created or migration fails.
    pub async fn new(database_url: &str) -> AppResult<Self> {
        let connect_url = if database_url.starts_with("sqlite:") && !database_url.contains('?') {
            format!("{database_url}?mode=rwc")
        } else {
            database_url.to_owned()
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&connect_url)
            .await
            .map_err(|e| AppError::database(format!("Failed to open database: {e}")))?;

        let db = Self { pool };
        db.migrate().await?;

        info!("Database ready at {}", database_url);
        Ok(db)
    }

    /// Access the underlying pool
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables if they do not exist yet
    async fn migrate(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS uploaded_files (
                id TEXT PRIMARY KEY,
                filename TEXT NOT NULL,
                file_type TEXT NOT NULL,
                content BLOB NOT NULL,
                columns TEXT NOT NULL,
                row_count INTEGER NOT NULL,
                sheet_names TEXT NOT NULL DEFAULT '[]',
                selected_sheet TEXT,
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to create uploaded_files: {e}")))?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS chat_sessions (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                dataset_keys TEXT NOT NULL DEFAULT '[]',
                file_metadata TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to create chat_sessions: {e}")))?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS chat_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                chart_config TEXT,
                thinking TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (session_id) REFERENCES chat_sessions(id) ON DELETE CASCADE
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to create chat_messages: {e}")))?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_chat_messages_session
            ON chat_messages(session_id, created_at)
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to create message index: {e}")))?;

        // SQLite enforces foreign keys only when asked
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to enable foreign keys: {e}")))?;

        Ok(())
    }
}
