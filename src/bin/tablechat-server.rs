// ABOUTME: TableChat server binary: wires config, storage, cache, and routes
// ABOUTME: Runs the axum HTTP server with SSE chat streaming
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 TableChat Contributors

use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use tablechat::cache::TieredCache;
use tablechat::config::ServerConfig;
use tablechat::database::{Database, FileManager, SessionManager};
use tablechat::errors::{AppError, AppResult};
use tablechat::llm::OpenAiCompatibleProvider;
use tablechat::routes::{self, AppState};
use tablechat::services::{ChatOrchestrator, CsvParser, SessionStore, TableService};

#[derive(Parser)]
#[command(name = "tablechat-server", about = "Chat with your tabular data")]
struct Args {
    /// HTTP port override (otherwise HTTP_PORT or 8000)
    #[arg(long)]
    http_port: Option<u16>,

    /// Database URL override (otherwise DATABASE_URL)
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> AppResult<()> {
    tablechat::logging::init_from_env()?;

    let args = Args::parse();
    let mut config = ServerConfig::from_env()?;
    if let Some(port) = args.http_port {
        config.http_port = port;
    }
    if let Some(url) = args.database_url {
        config.database_url = url;
    }

    info!("Starting TableChat: {}", config.summary());

    let db = Database::new(&config.database_url).await?;

    let cache = Arc::new(TieredCache::new(config.cache.clone()).await?);
    if cache.has_redis() {
        info!("Cache running with Redis tier");
    } else {
        warn!("Cache running in local-only mode");
    }

    let provider = Arc::new(OpenAiCompatibleProvider::from_config(&config.llm)?);

    let tables = Arc::new(TableService::new(
        Arc::clone(&cache),
        FileManager::new(db.pool().clone()),
        Arc::new(CsvParser),
    ));
    let sessions = Arc::new(SessionStore::new(
        SessionManager::new(db.pool().clone()),
        Arc::clone(&cache),
    ));
    let chat = Arc::new(ChatOrchestrator::new(
        provider,
        Arc::clone(&tables),
        Arc::clone(&sessions),
        config.stream_concurrency,
    ));

    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        cache,
        tables,
        sessions,
        chat,
    });

    let app = routes::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind {addr}: {e}")))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| AppError::internal(format!("Server error: {e}")))?;

    Ok(())
}
