// ABOUTME: Tests for chat orchestration with a scripted mock provider
// ABOUTME: Covers streaming persistence rules, chart extraction, and title derivation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 TableChat Contributors

use anyhow::Result;
use async_trait::async_trait;
use futures_util::StreamExt;
use std::sync::{Arc, Mutex};
use tablechat::cache::TieredCache;
use tablechat::config::CacheConfig;
use tablechat::database::{Database, FileManager, SessionManager};
use tablechat::errors::AppError;
use tablechat::llm::{
    ChatRequest, ChatResponse, ChatStream, LlmProvider, StreamChunk,
};
use tablechat::models::{FileMetadata, UploadedFile};
use tablechat::services::{
    ChatOrchestrator, ChatStreamEvent, CsvParser, SessionStore, TableService,
};
use tempfile::TempDir;

/// Scripted provider: emits fixed chunks, optionally failing partway through
struct MockProvider {
    chunks: Vec<String>,
    /// Fail after this many chunks, if set
    fail_after: Option<usize>,
    last_request: Mutex<Option<ChatRequest>>,
}

impl MockProvider {
    fn new(chunks: Vec<&str>, fail_after: Option<usize>) -> Self {
        Self {
            chunks: chunks.into_iter().map(ToOwned::to_owned).collect(),
            fail_after,
            last_request: Mutex::new(None),
        }
    }

    fn full_text(&self) -> String {
        self.chunks.concat()
    }

    fn last_system_prompt(&self) -> String {
        self.last_request
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|r| r.messages.first())
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn default_model(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, AppError> {
        *self.last_request.lock().unwrap() = Some(request.clone());
        if self.fail_after.is_some() {
            return Err(AppError::external_service("mock", "connection dropped"));
        }
        Ok(ChatResponse {
            content: self.full_text(),
            model: "mock-model".to_owned(),
            usage: None,
            finish_reason: Some("stop".to_owned()),
        })
    }

    async fn complete_stream(&self, request: &ChatRequest) -> Result<ChatStream, AppError> {
        *self.last_request.lock().unwrap() = Some(request.clone());

        let chunks = self.chunks.clone();
        let fail_after = self.fail_after;
        let total = chunks.len();

        let stream = async_stream::stream! {
            for (i, delta) in chunks.into_iter().enumerate() {
                if fail_after == Some(i) {
                    yield Err(AppError::external_service("mock", "connection dropped"));
                    return;
                }
                yield Ok(StreamChunk {
                    delta,
                    is_final: i + 1 == total,
                    finish_reason: (i + 1 == total).then(|| "stop".to_owned()),
                });
            }
        };

        Ok(Box::pin(stream))
    }

    async fn health_check(&self) -> Result<bool, AppError> {
        Ok(true)
    }
}

struct Harness {
    orchestrator: ChatOrchestrator,
    sessions: Arc<SessionStore>,
    provider: Arc<MockProvider>,
    files: FileManager,
    _dir: TempDir,
}

async fn create_harness(chunks: Vec<&str>, fail_after: Option<usize>) -> Result<Harness> {
    let dir = TempDir::new()?;
    let db_path = dir.path().join("test.db");
    let db = Database::new(&format!("sqlite:{}", db_path.display())).await?;

    let cache_config = CacheConfig {
        redis_url: None,
        enable_background_cleanup: false,
        ..CacheConfig::default()
    };
    let cache = Arc::new(TieredCache::new(cache_config).await?);

    let files = FileManager::new(db.pool().clone());
    let tables = Arc::new(TableService::new(
        Arc::clone(&cache),
        FileManager::new(db.pool().clone()),
        Arc::new(CsvParser),
    ));
    let sessions = Arc::new(SessionStore::new(
        SessionManager::new(db.pool().clone()),
        cache,
    ));
    let provider = Arc::new(MockProvider::new(chunks, fail_after));

    let orchestrator = ChatOrchestrator::new(
        Arc::clone(&provider) as Arc<dyn LlmProvider>,
        tables,
        Arc::clone(&sessions),
        4,
    );

    Ok(Harness {
        orchestrator,
        sessions,
        provider,
        files,
        _dir: dir,
    })
}

fn csv_file(id: &str, filename: &str) -> UploadedFile {
    UploadedFile {
        id: id.to_owned(),
        filename: filename.to_owned(),
        file_type: "csv".to_owned(),
        content: b"month,revenue\nJan,100\nFeb,140\n".to_vec(),
        columns: vec!["month".to_owned(), "revenue".to_owned()],
        row_count: 2,
        sheet_names: Vec::new(),
        selected_sheet: None,
        created_at: chrono::Utc::now(),
    }
}

#[tokio::test]
async fn single_shot_persists_both_messages() -> Result<()> {
    let harness = create_harness(vec!["The total is ", "240."], None).await?;
    let session = harness.sessions.create(None, &[], &[]).await?;

    let (stored, chart) = harness
        .orchestrator
        .send_message(&session.id, "What is the total revenue?", None)
        .await?;

    assert_eq!(stored.role, "assistant");
    assert_eq!(stored.content, "The total is 240.");
    assert!(chart.is_none());

    let detail = harness.sessions.get_detail(&session.id).await?.expect("detail");
    assert_eq!(detail.messages.len(), 2);
    assert_eq!(detail.messages[0].role, "user");
    assert_eq!(detail.messages[1].role, "assistant");
    Ok(())
}

#[tokio::test]
async fn title_derives_from_first_user_message() -> Result<()> {
    let harness = create_harness(vec!["ok"], None).await?;
    let session = harness.sessions.create(None, &[], &[]).await?;

    let long_message = "x".repeat(60);
    harness
        .orchestrator
        .send_message(&session.id, &long_message, None)
        .await?;

    let detail = harness.sessions.get_detail(&session.id).await?.expect("detail");
    assert_eq!(detail.session.title.chars().count(), 53);
    assert!(detail.session.title.ends_with("..."));

    // A second message leaves the title alone
    harness
        .orchestrator
        .send_message(&session.id, "another question", None)
        .await?;
    let detail = harness.sessions.get_detail(&session.id).await?.expect("detail");
    assert!(detail.session.title.starts_with("xxx"));
    Ok(())
}

#[tokio::test]
async fn chart_is_extracted_and_persisted() -> Result<()> {
    let harness = create_harness(
        vec![
            "Here you go:\n",
            "```json\n{\"series\": [{\"type\": \"bar\"}]}\n```",
        ],
        None,
    )
    .await?;
    let session = harness.sessions.create(None, &[], &[]).await?;

    let (stored, chart) = harness
        .orchestrator
        .send_message(&session.id, "Chart the revenue", None)
        .await?;

    let expected = serde_json::json!({"series": [{"type": "bar"}]});
    assert_eq!(chart, Some(expected.clone()));
    assert_eq!(stored.chart_config, Some(expected));
    Ok(())
}

#[tokio::test]
async fn missing_datasets_are_skipped_in_context() -> Result<()> {
    let harness = create_harness(vec!["ok"], None).await?;
    harness.files.save(&csv_file("valid", "sales.csv")).await?;

    let session = harness
        .sessions
        .create(
            None,
            &["valid".to_owned(), "missing".to_owned()],
            &[FileMetadata {
                file_id: "valid".to_owned(),
                filename: "sales.csv".to_owned(),
                sheet_names: Vec::new(),
                selected_sheets: Vec::new(),
            }],
        )
        .await?;

    harness
        .orchestrator
        .send_message(&session.id, "What do you see?", None)
        .await?;

    let system = harness.provider.last_system_prompt();
    assert!(system.contains("sales.csv"));
    assert!(system.contains("Feb"));
    assert!(!system.contains("missing"));
    Ok(())
}

#[tokio::test]
async fn file_ids_override_replaces_session_datasets() -> Result<()> {
    let harness = create_harness(vec!["ok"], None).await?;
    harness.files.save(&csv_file("other", "expenses.csv")).await?;

    let session = harness.sessions.create(None, &[], &[]).await?;
    let override_keys = vec!["other".to_owned()];

    harness
        .orchestrator
        .send_message(&session.id, "Summarize", Some(&override_keys))
        .await?;

    let system = harness.provider.last_system_prompt();
    assert!(system.contains("expenses.csv"));

    // The override is persisted onto the session
    let detail = harness.sessions.get_detail(&session.id).await?.expect("detail");
    assert_eq!(detail.session.dataset_keys, override_keys);
    Ok(())
}

#[tokio::test]
async fn empty_file_ids_override_keeps_session_datasets() -> Result<()> {
    let harness = create_harness(vec!["ok"], None).await?;
    harness.files.save(&csv_file("valid", "sales.csv")).await?;

    let session = harness
        .sessions
        .create(None, &["valid".to_owned()], &[])
        .await?;

    harness
        .orchestrator
        .send_message(&session.id, "Summarize", Some(&[]))
        .await?;

    let system = harness.provider.last_system_prompt();
    assert!(system.contains("sales.csv"));

    let detail = harness.sessions.get_detail(&session.id).await?.expect("detail");
    assert_eq!(detail.session.dataset_keys, vec!["valid"]);
    Ok(())
}

#[tokio::test]
async fn clean_stream_yields_chunks_then_done_and_persists() -> Result<()> {
    let harness = create_harness(
        vec!["part one ", "part two ", "```json\n{\"a\": 1}\n```"],
        None,
    )
    .await?;
    let session = harness.sessions.create(None, &[], &[]).await?;

    let stream = harness
        .orchestrator
        .stream_message(&session.id, "go", None)
        .await?;
    let events: Vec<ChatStreamEvent> = stream.collect().await;

    assert_eq!(events.len(), 4);
    for event in &events[..3] {
        assert!(matches!(event, ChatStreamEvent::Chunk { .. }));
    }
    match &events[3] {
        ChatStreamEvent::Done { chart_config } => {
            assert_eq!(chart_config, &Some(serde_json::json!({"a": 1})));
        }
        other => panic!("expected done event, got {other:?}"),
    }

    let detail = harness.sessions.get_detail(&session.id).await?.expect("detail");
    assert_eq!(detail.messages.len(), 2);
    assert!(detail.messages[1].content.contains("part two"));
    // A clean first exchange also derives the title
    assert_eq!(detail.session.title, "go");
    Ok(())
}

#[tokio::test]
async fn failed_stream_yields_error_and_persists_nothing_extra() -> Result<()> {
    let harness = create_harness(vec!["a", "b", "c", "never"], Some(3)).await?;
    let session = harness.sessions.create(None, &[], &[]).await?;

    let stream = harness
        .orchestrator
        .stream_message(&session.id, "go", None)
        .await?;
    let events: Vec<ChatStreamEvent> = stream.collect().await;

    assert_eq!(events.len(), 4);
    for event in &events[..3] {
        assert!(matches!(event, ChatStreamEvent::Chunk { .. }));
    }
    assert!(matches!(events[3], ChatStreamEvent::Error { .. }));

    // Only the user message survives a failed stream; the title stays put
    let detail = harness.sessions.get_detail(&session.id).await?.expect("detail");
    assert_eq!(detail.messages.len(), 1);
    assert_eq!(detail.messages[0].role, "user");
    assert_eq!(detail.session.title, "New conversation");
    Ok(())
}

#[tokio::test]
async fn failed_completion_leaves_title_untouched() -> Result<()> {
    let harness = create_harness(vec!["never"], Some(0)).await?;
    let session = harness.sessions.create(None, &[], &[]).await?;

    let err = harness
        .orchestrator
        .send_message(&session.id, "first question", None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("connection dropped"));

    let detail = harness.sessions.get_detail(&session.id).await?.expect("detail");
    assert_eq!(detail.messages.len(), 1);
    assert_eq!(detail.session.title, "New conversation");
    Ok(())
}

#[tokio::test]
async fn unknown_session_is_rejected() -> Result<()> {
    let harness = create_harness(vec!["ok"], None).await?;
    let err = harness
        .orchestrator
        .send_message("no-such-session", "hello", None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not found"));
    Ok(())
}
