// ABOUTME: Database operations for uploaded files
// ABOUTME: Stores raw file bytes alongside parsed metadata for on-demand reparsing
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 TableChat Contributors

use crate::errors::{AppError, AppResult};
use crate::models::UploadedFile;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

/// Uploaded file database operations
pub struct FileManager {
    pool: SqlitePool,
}

impl FileManager {
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert an uploaded file record
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the database operation fails
    pub async fn save(&self, file: &UploadedFile) -> AppResult<()> {
        let columns = serde_json::to_string(&file.columns)?;
        let sheet_names = serde_json::to_string(&file.sheet_names)?;

        sqlx::query(
            r"
            INSERT INTO uploaded_files (id, filename, file_type, content, columns, row_count, sheet_names, selected_sheet, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(&file.id)
        .bind(&file.filename)
        .bind(&file.file_type)
        .bind(&file.content)
        .bind(&columns)
        .bind(file.row_count)
        .bind(&sheet_names)
        .bind(&file.selected_sheet)
        .bind(file.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to save uploaded file: {e}")))?;

        Ok(())
    }

    /// Fetch a file by id
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn get(&self, file_id: &str) -> AppResult<Option<UploadedFile>> {
        let row = sqlx::query(
            r"
            SELECT id, filename, file_type, content, columns, row_count, sheet_names, selected_sheet, created_at
            FROM uploaded_files
            WHERE id = $1
            ",
        )
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to get uploaded file: {e}")))?;

        row.map(Self::row_to_file).transpose()
    }

    /// Fetch several files by id; unknown ids are simply absent from the result
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn get_many(&self, file_ids: &[String]) -> AppResult<Vec<UploadedFile>> {
        if file_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = (1..=file_ids.len())
            .map(|i| format!("${i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT id, filename, file_type, content, columns, row_count, sheet_names, selected_sheet, created_at
             FROM uploaded_files
             WHERE id IN ({placeholders})"
        );

        let mut query = sqlx::query(&sql);
        for file_id in file_ids {
            query = query.bind(file_id);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to get uploaded files: {e}")))?;

        rows.into_iter().map(Self::row_to_file).collect()
    }

    /// Update the active sheet for a workbook file
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn update_selected_sheet(&self, file_id: &str, sheet: &str) -> AppResult<bool> {
        let result = sqlx::query(
            r"
            UPDATE uploaded_files
            SET selected_sheet = $1
            WHERE id = $2
            ",
        )
        .bind(sheet)
        .bind(file_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to update selected sheet: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a file by id
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    pub async fn delete(&self, file_id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM uploaded_files WHERE id = $1")
            .bind(file_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to delete uploaded file: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    fn row_to_file(row: sqlx::sqlite::SqliteRow) -> AppResult<UploadedFile> {
        let columns: Vec<String> = serde_json::from_str(row.get("columns"))?;
        let sheet_names: Vec<String> = serde_json::from_str(row.get("sheet_names"))?;
        let created_at: String = row.get("created_at");

        Ok(UploadedFile {
            id: row.get("id"),
            filename: row.get("filename"),
            file_type: row.get("file_type"),
            content: row.get("content"),
            columns,
            row_count: row.get("row_count"),
            sheet_names,
            selected_sheet: row.get("selected_sheet"),
            created_at: parse_timestamp(&created_at)?,
        })
    }
}

/// Parse an RFC 3339 timestamp stored as TEXT
pub(crate) fn parse_timestamp(raw: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::database(format!("Invalid timestamp '{raw}': {e}")))
}
