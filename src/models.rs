// ABOUTME: Core domain types: tables, uploaded files, dataset keys, sessions, messages
// ABOUTME: Shared between the database layer, services, and HTTP routes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 TableChat Contributors

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A parsed tabular dataset: named columns plus string-valued rows.
///
/// Cells are kept as strings; numeric interpretation is left to the model
/// reading the rendered table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    #[must_use]
    pub const fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// First `n` rows as JSON objects keyed by column name.
    ///
    /// Rows shorter than the header are padded with empty strings.
    #[must_use]
    pub fn preview(&self, n: usize) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.rows
            .iter()
            .take(n)
            .map(|row| {
                self.columns
                    .iter()
                    .enumerate()
                    .map(|(i, col)| {
                        let cell = row.get(i).cloned().unwrap_or_default();
                        (col.clone(), serde_json::Value::String(cell))
                    })
                    .collect()
            })
            .collect()
    }

    /// Render the table as column-aligned plain text for prompt context.
    #[must_use]
    pub fn to_display_string(&self) -> String {
        let mut widths: Vec<usize> = self.columns.iter().map(String::len).collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                if i < widths.len() && cell.len() > widths[i] {
                    widths[i] = cell.len();
                }
            }
        }

        let render_row = |cells: &[String]| -> String {
            widths
                .iter()
                .enumerate()
                .map(|(i, w)| {
                    let cell = cells.get(i).map_or("", String::as_str);
                    format!("{cell:<w$}")
                })
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_owned()
        };

        let mut out = render_row(&self.columns);
        for row in &self.rows {
            out.push('\n');
            out.push_str(&render_row(row));
        }
        out
    }
}

/// Identifies one dataset: a file, optionally narrowed to one sheet.
///
/// The string form is `{file_id}` or `{file_id}:{sheet}`. Keys are compared
/// verbatim, so `"f1"` and `"f1:Sheet1"` are distinct even when Sheet1 is
/// the file's only sheet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatasetKey {
    pub file_id: String,
    pub sheet: Option<String>,
}

impl DatasetKey {
    #[must_use]
    pub fn new(file_id: impl Into<String>, sheet: Option<String>) -> Self {
        Self {
            file_id: file_id.into(),
            sheet,
        }
    }

    /// Parse the string form. File ids never contain `:`, so the first colon
    /// separates the sheet name.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((file_id, sheet)) => Self {
                file_id: file_id.to_owned(),
                sheet: Some(sheet.to_owned()),
            },
            None => Self {
                file_id: raw.to_owned(),
                sheet: None,
            },
        }
    }

    /// Human-readable name for prompt context: `{filename}` or
    /// `{filename} [Sheet: {sheet}]`.
    #[must_use]
    pub fn display_name(&self, filename: &str) -> String {
        match &self.sheet {
            Some(sheet) => format!("{filename} [Sheet: {sheet}]"),
            None => filename.to_owned(),
        }
    }
}

impl fmt::Display for DatasetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sheet {
            Some(sheet) => write!(f, "{}:{}", self.file_id, sheet),
            None => write!(f, "{}", self.file_id),
        }
    }
}

/// Stored record of an uploaded file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedFile {
    pub id: String,
    pub filename: String,
    /// Lowercased extension without the dot, e.g. `csv`, `xlsx`
    pub file_type: String,
    /// Raw uploaded bytes, kept for on-demand reparsing
    #[serde(skip_serializing)]
    pub content: Vec<u8>,
    pub columns: Vec<String>,
    pub row_count: i64,
    /// Sheet names for workbook formats; empty for CSV
    pub sheet_names: Vec<String>,
    /// Currently active sheet for workbook formats
    pub selected_sheet: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Per-file attachment metadata stored on a chat session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub file_id: String,
    pub filename: String,
    #[serde(default)]
    pub sheet_names: Vec<String>,
    /// Sheets the user chose to expose to the conversation
    #[serde(default)]
    pub selected_sheets: Vec<String>,
}

/// A chat session row, without its messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub title: String,
    /// Dataset keys attached to this conversation
    pub dataset_keys: Vec<String>,
    /// Attachment metadata, parallel to `dataset_keys` by file
    pub file_metadata: Vec<FileMetadata>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single message within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: i64,
    pub session_id: String,
    /// `user` or `assistant`
    pub role: String,
    pub content: String,
    /// Chart configuration extracted from an assistant reply, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart_config: Option<serde_json::Value>,
    /// Model reasoning text, when the provider exposes it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A session together with its full message history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: ChatSession,
    pub messages: Vec<StoredMessage>,
}

/// One page of the session list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPage {
    pub sessions: Vec<ChatSession>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
    /// Whether pages beyond this one exist
    pub has_more: bool,
}

/// A chart extracted from an assistant message, joined with its session title.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedChart {
    pub message_id: i64,
    pub session_id: String,
    pub session_title: String,
    pub chart_config: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// One page of saved charts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartPage {
    pub charts: Vec<SavedChart>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_key_round_trip() {
        let plain = DatasetKey::parse("abc123");
        assert_eq!(plain.file_id, "abc123");
        assert_eq!(plain.sheet, None);
        assert_eq!(plain.to_string(), "abc123");

        let sheeted = DatasetKey::parse("abc123:Sales Q2");
        assert_eq!(sheeted.file_id, "abc123");
        assert_eq!(sheeted.sheet.as_deref(), Some("Sales Q2"));
        assert_eq!(sheeted.to_string(), "abc123:Sales Q2");
    }

    #[test]
    fn dataset_keys_with_and_without_sheet_are_distinct() {
        let a = DatasetKey::parse("f1");
        let b = DatasetKey::parse("f1:Sheet1");
        assert_ne!(a, b);
        assert_ne!(a.to_string(), b.to_string());
    }

    #[test]
    fn display_name_includes_sheet() {
        let key = DatasetKey::new("f1", Some("Costs".to_owned()));
        assert_eq!(key.display_name("budget.xlsx"), "budget.xlsx [Sheet: Costs]");
        let plain = DatasetKey::new("f2", None);
        assert_eq!(plain.display_name("data.csv"), "data.csv");
    }

    #[test]
    fn preview_pads_short_rows() {
        let table = Table::new(
            vec!["a".into(), "b".into()],
            vec![vec!["1".into()], vec!["2".into(), "3".into()]],
        );
        let preview = table.preview(5);
        assert_eq!(preview.len(), 2);
        assert_eq!(preview[0]["b"], serde_json::Value::String(String::new()));
        assert_eq!(preview[1]["b"], serde_json::Value::String("3".into()));
    }

    #[test]
    fn display_string_aligns_columns() {
        let table = Table::new(
            vec!["name".into(), "amount".into()],
            vec![
                vec!["widget".into(), "5".into()],
                vec!["gizmo".into(), "12".into()],
            ],
        );
        let rendered = table.to_display_string();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("name"));
        assert!(lines[1].contains("widget"));
    }
}
