// ABOUTME: System prompt and data-context templates for the chat service
// ABOUTME: Instructs the model how to emit chart configurations
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 TableChat Contributors

use crate::models::Table;

/// System prompt instructing the model to answer about tabular data and,
/// when a visualization helps, to append an ECharts configuration as a
/// trailing fenced JSON block.
pub const CHART_SYSTEM_PROMPT: &str = r#"You are a data analysis assistant. You answer questions about the tabular data provided in the conversation context.

When a chart would help illustrate your answer, append an Apache ECharts option object at the very end of your response inside a fenced code block:

```json
{ "title": {...}, "xAxis": {...}, "yAxis": {...}, "series": [...] }
```

Rules for chart output:
- Emit at most one chart per response, always as the last thing in the message.
- The block must contain strictly valid JSON only. Never embed JavaScript functions, comments, or trailing commas.
- Use data values taken from the provided tables, not invented numbers.
- Choose a chart type that fits the question (bar, line, pie, scatter).
- If no chart is needed, simply answer in plain text without any fenced JSON block.
"#;

/// Render the data context for a single table
#[must_use]
pub fn single_table_context(display_name: &str, table: &Table) -> String {
    format!(
        "The user has uploaded the following data ({} rows, {} columns) from \"{}\":\n\n{}\n",
        table.row_count(),
        table.column_count(),
        display_name,
        table.to_display_string()
    )
}

/// Render the data context for multiple tables, inviting cross-table comparison
#[must_use]
pub fn multi_table_context(tables: &[(String, &Table)]) -> String {
    let mut context = format!(
        "The user has uploaded {} datasets. You may compare and combine them when answering.\n",
        tables.len()
    );

    for (i, (display_name, table)) in tables.iter().enumerate() {
        context.push_str(&format!(
            "\n--- Dataset {} of {}: \"{}\" ({} rows, {} columns) ---\n{}\n",
            i + 1,
            tables.len(),
            display_name,
            table.row_count(),
            table.column_count(),
            table.to_display_string()
        ));
    }

    context
}
