// ABOUTME: File upload and inspection endpoints
// ABOUTME: Accepts CSV and spreadsheet uploads and exposes previews and sheet switching
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 TableChat Contributors

use super::{with_rate_limit, AppState};
use crate::errors::{AppError, AppResult};
use crate::middleware::RateLimiter;
use axum::extract::{Multipart, Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Extensions accepted for upload
const ALLOWED_EXTENSIONS: &[&str] = &["csv", "xlsx", "xls", "xlsm"];

/// Rows included in the upload response preview
const UPLOAD_PREVIEW_ROWS: usize = 5;

/// Rows included in the file info preview
const INFO_PREVIEW_ROWS: usize = 10;

/// Response for a successful upload
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Assigned file id
    pub file_id: String,
    /// Original filename
    pub filename: String,
    /// Column names of the active table
    pub columns: Vec<String>,
    /// First rows of the active table
    pub preview: Vec<serde_json::Map<String, serde_json::Value>>,
    /// Total row count
    pub row_count: usize,
    /// Sheet names for workbook formats
    pub sheet_names: Vec<String>,
    /// Active sheet, if any
    pub selected_sheet: Option<String>,
}

/// Request body for switching the active sheet
#[derive(Debug, Deserialize)]
pub struct SwitchSheetRequest {
    /// Sheet to activate
    pub sheet_name: String,
}

/// Optional sheet selection on upload and file info requests
#[derive(Debug, Default, Deserialize)]
pub struct SheetQuery {
    /// Sheet to parse instead of the file's active sheet
    pub sheet_name: Option<String>,
}

/// Request body for exposing several sheets as datasets
#[derive(Debug, Deserialize)]
pub struct SelectSheetsRequest {
    /// Sheets to expose
    pub sheet_names: Vec<String>,
}

/// One selected sheet in a [`SelectSheetsResponse`]
#[derive(Debug, Serialize)]
pub struct SelectedSheet {
    /// Dataset key addressing this sheet (`file_id:sheet_name`)
    pub data_source_id: String,
    /// Owning file id
    pub file_id: String,
    /// Sheet name
    pub sheet_name: String,
    /// Column names of the sheet
    pub columns: Vec<String>,
    /// Total row count
    pub rows: usize,
    /// First rows of the sheet
    pub preview: Vec<serde_json::Map<String, serde_json::Value>>,
}

/// Response for a multi-sheet selection
#[derive(Debug, Serialize)]
pub struct SelectSheetsResponse {
    /// Owning file id
    pub file_id: String,
    /// Original filename
    pub filename: String,
    /// All sheet names in the file
    pub sheet_names: Vec<String>,
    /// The selected sheets with their previews
    pub selected_sheets: Vec<SelectedSheet>,
}

/// File route handlers
pub struct FileRoutes;

impl FileRoutes {
    /// Create the file routes; uploads sit behind the rate limiter
    pub fn routes(state: Arc<AppState>, upload_limiter: &RateLimiter) -> Router {
        let upload = with_rate_limit(
            Router::new()
                .route("/api/upload", post(Self::upload))
                .with_state(state.clone()),
            upload_limiter,
        );

        upload.merge(
            Router::new()
                .route("/api/files/:file_id", get(Self::file_info))
                .route("/api/files/:file_id/switch-sheet", post(Self::switch_sheet))
                .route("/api/files/:file_id/select-sheets", post(Self::select_sheets))
                .with_state(state),
        )
    }

    /// `POST /api/upload`
    async fn upload(
        State(state): State<Arc<AppState>>,
        Query(query): Query<SheetQuery>,
        mut multipart: Multipart,
    ) -> AppResult<Json<UploadResponse>> {
        let mut payload: Option<(String, Vec<u8>)> = None;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::invalid_input(format!("Invalid multipart body: {e}")))?
        {
            if field.name() == Some("file") {
                let filename = field
                    .file_name()
                    .ok_or_else(|| AppError::invalid_input("Upload is missing a filename"))?
                    .to_owned();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::invalid_input(format!("Failed to read upload: {e}")))?;
                payload = Some((filename, bytes.to_vec()));
            }
        }

        let (filename, content) =
            payload.ok_or_else(|| AppError::invalid_input("Missing 'file' field in upload"))?;

        let file_type = file_extension(&filename)?;

        let (file, table) = state
            .tables
            .ingest_upload(&filename, &file_type, content, query.sheet_name.as_deref())
            .await?;

        info!(
            "Uploaded '{}' as {} ({} rows, {} columns)",
            filename,
            file.id,
            table.row_count(),
            table.column_count()
        );

        Ok(Json(UploadResponse {
            file_id: file.id,
            filename: file.filename,
            columns: table.columns.clone(),
            preview: table.preview(UPLOAD_PREVIEW_ROWS),
            row_count: table.row_count(),
            sheet_names: file.sheet_names,
            selected_sheet: file.selected_sheet,
        }))
    }

    /// `GET /api/files/{file_id}`
    async fn file_info(
        State(state): State<Arc<AppState>>,
        Path(file_id): Path<String>,
        Query(query): Query<SheetQuery>,
    ) -> AppResult<Json<UploadResponse>> {
        let file = state
            .tables
            .get_file(&file_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("File '{file_id}'")))?;

        let sheet = query.sheet_name.or_else(|| file.selected_sheet.clone());
        let key = crate::models::DatasetKey::new(file.id.clone(), sheet.clone());
        let table = state.tables.get_table(&key).await?;

        Ok(Json(UploadResponse {
            file_id: file.id,
            filename: file.filename,
            columns: table.columns.clone(),
            preview: table.preview(INFO_PREVIEW_ROWS),
            row_count: table.row_count(),
            sheet_names: file.sheet_names,
            selected_sheet: sheet,
        }))
    }

    /// `POST /api/files/{file_id}/switch-sheet`
    async fn switch_sheet(
        State(state): State<Arc<AppState>>,
        Path(file_id): Path<String>,
        Json(request): Json<SwitchSheetRequest>,
    ) -> AppResult<Json<UploadResponse>> {
        let table = state
            .tables
            .switch_sheet(&file_id, &request.sheet_name)
            .await?;

        let file = state
            .tables
            .get_file(&file_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("File '{file_id}'")))?;

        Ok(Json(UploadResponse {
            file_id: file.id,
            filename: file.filename,
            columns: table.columns.clone(),
            preview: table.preview(INFO_PREVIEW_ROWS),
            row_count: table.row_count(),
            sheet_names: file.sheet_names,
            selected_sheet: file.selected_sheet,
        }))
    }

    /// `POST /api/files/{file_id}/select-sheets`
    ///
    /// Exposes each selected sheet as its own dataset, addressable by the
    /// `file_id:sheet_name` composite key.
    async fn select_sheets(
        State(state): State<Arc<AppState>>,
        Path(file_id): Path<String>,
        Json(request): Json<SelectSheetsRequest>,
    ) -> AppResult<Json<SelectSheetsResponse>> {
        let (file, tables) = state
            .tables
            .select_sheets(&file_id, &request.sheet_names)
            .await?;

        let selected_sheets = tables
            .into_iter()
            .map(|(sheet_name, table)| SelectedSheet {
                data_source_id: format!("{file_id}:{sheet_name}"),
                file_id: file_id.clone(),
                sheet_name,
                columns: table.columns.clone(),
                rows: table.row_count(),
                preview: table.preview(INFO_PREVIEW_ROWS),
            })
            .collect();

        Ok(Json(SelectSheetsResponse {
            file_id: file.id,
            filename: file.filename,
            sheet_names: file.sheet_names,
            selected_sheets,
        }))
    }
}

/// Extract and validate the lowercased file extension
fn file_extension(filename: &str) -> AppResult<String> {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .ok_or_else(|| AppError::invalid_input("Filename has no extension"))?;

    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(AppError::invalid_input(format!(
            "Unsupported file type '.{extension}'; expected one of: {}",
            ALLOWED_EXTENSIONS.join(", ")
        )));
    }

    Ok(extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_known_extensions() {
        assert_eq!(file_extension("data.csv").unwrap(), "csv");
        assert_eq!(file_extension("Budget.XLSX").unwrap(), "xlsx");
        assert_eq!(file_extension("a.b.xlsm").unwrap(), "xlsm");
    }

    #[test]
    fn rejects_unknown_extensions() {
        assert!(file_extension("notes.txt").is_err());
        assert!(file_extension("noextension").is_err());
    }
}
