// ABOUTME: Service layer: chat orchestration, table access, session coherence
// ABOUTME: Routes call into these services rather than touching storage directly
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 TableChat Contributors

/// Chat orchestration and streaming
pub mod chat;
/// Chart extraction from assistant responses
pub mod charts;
/// Cache-coherent session access
pub mod sessions;
/// Cache-backed table access and parsing
pub mod tables;

pub use chat::{ChatOrchestrator, ChatStreamEvent};
pub use charts::extract_chart_config;
pub use sessions::SessionStore;
pub use tables::{CsvParser, SheetParser, TableService};
