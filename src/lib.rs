// ABOUTME: Main library entry point for the TableChat server
// ABOUTME: Chat with uploaded tabular data, with chart extraction and tiered caching
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 TableChat Contributors

#![deny(unsafe_code)]

//! # TableChat
//!
//! A server for conversing with uploaded tabular data. Users upload CSV or
//! spreadsheet files, chat with a model about their contents, and receive
//! chart configurations extracted from the model's replies.
//!
//! ## Features
//!
//! - **Tiered caching**: Redis shared tier with an in-process fallback;
//!   degraded cache mode never surfaces as an error
//! - **Streaming chat**: SSE responses with chunk/done/error events,
//!   persisted only on clean completion
//! - **Chart extraction**: trailing fenced JSON blocks are parsed into
//!   ECharts configurations, with a repair pass for embedded JS functions
//! - **Sheet-aware datasets**: workbook files expose per-sheet dataset keys
//!
//! ## Example
//!
//! ```rust,no_run
//! use tablechat::config::ServerConfig;
//! use tablechat::errors::AppResult;
//!
//! #[tokio::main]
//! async fn main() -> AppResult<()> {
//!     let config = ServerConfig::from_env()?;
//!     println!("TableChat configured for port {}", config.http_port);
//!     Ok(())
//! }
//! ```

/// Cache abstraction and the tiered Redis/local implementation
pub mod cache;
/// Environment-driven configuration
pub mod config;
/// SQLite persistence layer
pub mod database;
/// Application errors and HTTP error responses
pub mod errors;
/// LLM provider abstraction and the OpenAI-compatible implementation
pub mod llm;
/// Tracing initialization
pub mod logging;
/// HTTP middleware
pub mod middleware;
/// Core domain types
pub mod models;
/// HTTP routes
pub mod routes;
/// Service layer
pub mod services;
