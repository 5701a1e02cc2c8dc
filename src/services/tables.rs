// ABOUTME: Table access service: cache-backed lookup with reparse fallback
// ABOUTME: Defines the SheetParser seam and the built-in CSV parser
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 TableChat Contributors

use crate::cache::{CacheKey, TieredCache};
use crate::database::FileManager;
use crate::errors::{AppError, AppResult};
use crate::models::{DatasetKey, FileMetadata, Table, UploadedFile};
use std::sync::Arc;
use tracing::debug;

/// Parses uploaded file bytes into tables.
///
/// The built-in [`CsvParser`] covers CSV; workbook formats (xlsx, xls, xlsm)
/// plug in through this trait.
pub trait SheetParser: Send + Sync {
    /// Parse the file, optionally narrowed to one sheet.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not parseable or the sheet is unknown.
    fn parse(&self, content: &[u8], file_type: &str, sheet: Option<&str>) -> AppResult<Table>;

    /// Sheet names contained in the file; empty for single-table formats.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not parseable.
    fn sheet_names(&self, content: &[u8], file_type: &str) -> AppResult<Vec<String>>;
}

/// CSV parser using the first record as the header row.
///
/// Missing trailing cells become empty strings, matching how ragged
/// spreadsheet exports usually look.
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvParser;

impl SheetParser for CsvParser {
    fn parse(&self, content: &[u8], file_type: &str, sheet: Option<&str>) -> AppResult<Table> {
        if file_type != "csv" {
            return Err(AppError::invalid_input(format!(
                "Unsupported file type '{file_type}', expected csv"
            )));
        }
        if let Some(sheet) = sheet {
            return Err(AppError::invalid_input(format!(
                "CSV files have no sheets, got sheet '{sheet}'"
            )));
        }

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(content);

        let columns: Vec<String> = reader
            .headers()
            .map_err(|e| AppError::invalid_input(format!("Failed to read CSV header: {e}")))?
            .iter()
            .map(ToOwned::to_owned)
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record =
                record.map_err(|e| AppError::invalid_input(format!("Invalid CSV row: {e}")))?;
            let mut row: Vec<String> = record.iter().map(ToOwned::to_owned).collect();
            row.resize(columns.len(), String::new());
            rows.push(row);
        }

        Ok(Table::new(columns, rows))
    }

    fn sheet_names(&self, _content: &[u8], _file_type: &str) -> AppResult<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Cache-backed table access.
///
/// Lookup order: tiered cache, then reparse from the stored file bytes with
/// a write-back into the cache.
pub struct TableService {
    cache: Arc<TieredCache>,
    files: FileManager,
    parser: Arc<dyn SheetParser>,
}

impl TableService {
    #[must_use]
    pub fn new(cache: Arc<TieredCache>, files: FileManager, parser: Arc<dyn SheetParser>) -> Self {
        Self {
            cache,
            files,
            parser,
        }
    }

    /// Cache the parsed table under its dataset key
    async fn seed(&self, key: &DatasetKey, table: &Table) {
        self.cache.set(&CacheKey::table(key.to_string()), table).await;
    }

    /// Fetch the table for a dataset key.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` when the file id is unknown, or a parse
    /// error when the stored bytes no longer parse.
    pub async fn get_table(&self, key: &DatasetKey) -> AppResult<Table> {
        let cache_key = CacheKey::table(key.to_string());

        if let Some(table) = self.cache.get::<Table>(&cache_key).await {
            debug!("Table cache hit for {}", key);
            return Ok(table);
        }

        let file = self
            .files
            .get(&key.file_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("File '{}'", key.file_id)))?;

        let table = self
            .parser
            .parse(&file.content, &file.file_type, key.sheet.as_deref())?;

        debug!("Reparsed {} ({} rows) after cache miss", key, table.row_count());
        self.seed(key, &table).await;

        Ok(table)
    }

    /// Parse an upload, store the file record, and cache the parsed table.
    ///
    /// For workbook formats the first sheet becomes the selected sheet and
    /// the cached dataset key carries its name.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` when the bytes do not parse, or a database
    /// error when the record cannot be stored.
    pub async fn ingest_upload(
        &self,
        filename: &str,
        file_type: &str,
        content: Vec<u8>,
        requested_sheet: Option<&str>,
    ) -> AppResult<(UploadedFile, Table)> {
        let sheet_names = self.parser.sheet_names(&content, file_type)?;
        let selected_sheet = requested_sheet
            .filter(|s| sheet_names.iter().any(|name| name == s))
            .map(ToOwned::to_owned)
            .or_else(|| sheet_names.first().cloned());

        let table = self
            .parser
            .parse(&content, file_type, selected_sheet.as_deref())?;

        let file = UploadedFile {
            id: uuid::Uuid::new_v4().to_string(),
            filename: filename.to_owned(),
            file_type: file_type.to_owned(),
            content,
            columns: table.columns.clone(),
            row_count: i64::try_from(table.row_count()).unwrap_or(i64::MAX),
            sheet_names,
            selected_sheet: selected_sheet.clone(),
            created_at: chrono::Utc::now(),
        };

        self.files.save(&file).await?;

        let key = DatasetKey::new(file.id.clone(), selected_sheet);
        self.seed(&key, &table).await;

        Ok((file, table))
    }

    /// Look up the stored file record
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn get_file(&self, file_id: &str) -> AppResult<Option<UploadedFile>> {
        self.files.get(file_id).await
    }

    /// Switch a workbook file's active sheet, seeding the sheet's cache entry.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for an unknown file and `InvalidInput` for
    /// an unknown sheet or a sheetless format.
    pub async fn switch_sheet(&self, file_id: &str, sheet: &str) -> AppResult<Table> {
        let file = self
            .files
            .get(file_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("File '{file_id}'")))?;

        if file.sheet_names.is_empty() {
            return Err(AppError::invalid_input(format!(
                "File '{}' has no sheets",
                file.filename
            )));
        }
        if !file.sheet_names.iter().any(|s| s == sheet) {
            return Err(AppError::invalid_input(format!(
                "Sheet '{}' not found in '{}'",
                sheet, file.filename
            )));
        }

        let table = self.parser.parse(&file.content, &file.file_type, Some(sheet))?;

        self.files.update_selected_sheet(file_id, sheet).await?;
        let key = DatasetKey::new(file_id, Some(sheet.to_owned()));
        self.seed(&key, &table).await;

        Ok(table)
    }

    /// Validate a sheet selection against the stored file.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for an unknown file and `InvalidInput` when
    /// any requested sheet is absent.
    pub async fn validate_sheets(&self, file_id: &str, sheets: &[String]) -> AppResult<UploadedFile> {
        let file = self
            .files
            .get(file_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("File '{file_id}'")))?;

        for sheet in sheets {
            if !file.sheet_names.iter().any(|s| s == sheet) {
                return Err(AppError::invalid_input(format!(
                    "Sheet '{}' not found in '{}'",
                    sheet, file.filename
                )));
            }
        }

        Ok(file)
    }

    /// Expose several sheets of one workbook as independent datasets.
    ///
    /// Each selected sheet is parsed and cached under `file_id:sheet`, making
    /// it addressable as its own dataset key.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for an unknown file and `InvalidInput` for
    /// a sheetless format or an unknown sheet name.
    pub async fn select_sheets(
        &self,
        file_id: &str,
        sheets: &[String],
    ) -> AppResult<(UploadedFile, Vec<(String, Table)>)> {
        let file = self.validate_sheets(file_id, sheets).await?;
        if file.sheet_names.is_empty() {
            return Err(AppError::invalid_input(format!(
                "File '{}' has no sheets",
                file.filename
            )));
        }

        let mut tables = Vec::with_capacity(sheets.len());
        for sheet in sheets {
            let key = DatasetKey::new(file_id, Some(sheet.clone()));
            let table = self.get_table(&key).await?;
            tables.push((sheet.clone(), table));
        }

        Ok((file, tables))
    }

    /// Validate attachment metadata against the stored files in one batch.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` when a referenced file is unknown and
    /// `InvalidInput` when a selected sheet is absent from its file.
    pub async fn validate_metadata(&self, metadata: &[FileMetadata]) -> AppResult<()> {
        let file_ids: Vec<String> = metadata.iter().map(|m| m.file_id.clone()).collect();
        let files = self.files.get_many(&file_ids).await?;

        for entry in metadata {
            let file = files
                .iter()
                .find(|f| f.id == entry.file_id)
                .ok_or_else(|| AppError::not_found(format!("File '{}'", entry.file_id)))?;

            for sheet in &entry.selected_sheets {
                if !file.sheet_names.iter().any(|s| s == sheet) {
                    return Err(AppError::invalid_input(format!(
                        "Sheet '{}' not found in '{}'",
                        sheet, file.filename
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_parser_reads_header_and_rows() {
        let data = b"name,amount\nwidget,5\ngizmo,12\n";
        let table = CsvParser.parse(data, "csv", None).unwrap();
        assert_eq!(table.columns, vec!["name", "amount"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1], vec!["gizmo", "12"]);
    }

    #[test]
    fn csv_parser_pads_short_rows() {
        let data = b"a,b,c\n1,2\n";
        let table = CsvParser.parse(data, "csv", None).unwrap();
        assert_eq!(table.rows[0], vec!["1", "2", ""]);
    }

    #[test]
    fn csv_parser_rejects_sheet_selection() {
        let err = CsvParser.parse(b"a\n1\n", "csv", Some("Sheet1")).unwrap_err();
        assert!(err.to_string().contains("no sheets"));
    }

    #[test]
    fn csv_parser_rejects_other_formats() {
        assert!(CsvParser.parse(b"", "xlsx", None).is_err());
    }
}
