// ABOUTME: Tests for cache-coherent session storage
// ABOUTME: Mutations must never leave stale cached session state behind
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 TableChat Contributors

use anyhow::Result;
use std::sync::Arc;
use tablechat::cache::{CacheKey, TieredCache};
use tablechat::config::CacheConfig;
use tablechat::database::{Database, SessionManager};
use tablechat::models::{FileMetadata, SessionDetail, SessionPage};
use tablechat::services::SessionStore;
use tempfile::TempDir;

/// Session store over a fresh on-disk SQLite database and a local-only cache
async fn create_test_store() -> Result<(SessionStore, TempDir)> {
    let dir = TempDir::new()?;
    let db_path = dir.path().join("test.db");
    let db = Database::new(&format!("sqlite:{}", db_path.display())).await?;

    let cache_config = CacheConfig {
        redis_url: None,
        enable_background_cleanup: false,
        ..CacheConfig::default()
    };
    let cache = Arc::new(TieredCache::new(cache_config).await?);

    Ok((
        SessionStore::new(SessionManager::new(db.pool().clone()), cache),
        dir,
    ))
}

fn metadata(file_id: &str, filename: &str) -> FileMetadata {
    FileMetadata {
        file_id: file_id.to_owned(),
        filename: filename.to_owned(),
        sheet_names: Vec::new(),
        selected_sheets: Vec::new(),
    }
}

#[tokio::test]
async fn create_and_fetch_detail() -> Result<()> {
    let (store, _dir) = create_test_store().await?;

    let session = store
        .create(
            None,
            &["f1".to_owned(), "f2:Sheet1".to_owned()],
            &[metadata("f1", "a.csv")],
        )
        .await?;

    let detail = store.get_detail(&session.id).await?.expect("detail");
    assert_eq!(detail.session.dataset_keys, vec!["f1", "f2:Sheet1"]);
    assert_eq!(detail.session.file_metadata[0].filename, "a.csv");
    assert!(detail.messages.is_empty());
    Ok(())
}

#[tokio::test]
async fn explicit_title_overrides_placeholder() -> Result<()> {
    let (store, _dir) = create_test_store().await?;

    let placeholder = store.create(None, &[], &[]).await?;
    assert_eq!(placeholder.title, "New conversation");

    let named = store.create(Some("Q3 revenue"), &[], &[]).await?;
    assert_eq!(named.title, "Q3 revenue");
    let detail = store.get_detail(&named.id).await?.expect("detail");
    assert_eq!(detail.session.title, "Q3 revenue");
    Ok(())
}

#[tokio::test]
async fn new_message_is_visible_after_cached_read() -> Result<()> {
    let (store, _dir) = create_test_store().await?;
    let session = store.create(None, &[], &[]).await?;

    // Prime the detail cache
    let detail = store.get_detail(&session.id).await?.expect("detail");
    assert!(detail.messages.is_empty());

    store
        .add_message(&session.id, "user", "hello", None, None)
        .await?;

    let detail = store.get_detail(&session.id).await?.expect("detail");
    assert_eq!(detail.messages.len(), 1);
    assert_eq!(detail.messages[0].content, "hello");
    Ok(())
}

#[tokio::test]
async fn add_message_drops_detail_but_keeps_list_pages() -> Result<()> {
    let dir = TempDir::new()?;
    let db_path = dir.path().join("test.db");
    let db = Database::new(&format!("sqlite:{}", db_path.display())).await?;
    let cache_config = CacheConfig {
        redis_url: None,
        enable_background_cleanup: false,
        ..CacheConfig::default()
    };
    let cache = Arc::new(TieredCache::new(cache_config).await?);
    let store = SessionStore::new(SessionManager::new(db.pool().clone()), Arc::clone(&cache));

    let session = store.create(None, &[], &[]).await?;
    store.get_detail(&session.id).await?;
    store.list(1, 20, None).await?;

    store
        .add_message(&session.id, "user", "hello", None, None)
        .await?;

    // The detail entry is gone; list pages ride out their own TTL
    assert!(cache
        .get::<SessionDetail>(&CacheKey::session_detail(session.id.as_str()))
        .await
        .is_none());
    assert!(cache
        .get::<SessionPage>(&CacheKey::session_list(1, 20, None))
        .await
        .is_some());
    Ok(())
}

#[tokio::test]
async fn title_update_is_visible_after_cached_read() -> Result<()> {
    let (store, _dir) = create_test_store().await?;
    let session = store.create(None, &[], &[]).await?;

    store.get_detail(&session.id).await?;
    assert!(store.update_title(&session.id, "Quarterly numbers").await?);

    let detail = store.get_detail(&session.id).await?.expect("detail");
    assert_eq!(detail.session.title, "Quarterly numbers");
    Ok(())
}

#[tokio::test]
async fn file_metadata_update_is_visible_after_cached_read() -> Result<()> {
    let (store, _dir) = create_test_store().await?;
    let session = store.create(None, &[], &[]).await?;

    store.get_detail(&session.id).await?;
    assert!(
        store
            .update_file_metadata(&session.id, &[metadata("f9", "late.csv")])
            .await?
    );

    let detail = store.get_detail(&session.id).await?.expect("detail");
    assert_eq!(detail.session.file_metadata[0].file_id, "f9");
    Ok(())
}

#[tokio::test]
async fn deleted_session_disappears_from_cache_and_list() -> Result<()> {
    let (store, _dir) = create_test_store().await?;
    let session = store.create(None, &[], &[]).await?;

    // Prime both caches
    store.get_detail(&session.id).await?;
    let listing = store.list(1, 20, None).await?;
    assert_eq!(listing.total, 1);

    assert!(store.delete(&session.id).await?);

    assert!(store.get_detail(&session.id).await?.is_none());
    let listing = store.list(1, 20, None).await?;
    assert_eq!(listing.total, 0);
    Ok(())
}

#[tokio::test]
async fn delete_returns_false_for_unknown_session() -> Result<()> {
    let (store, _dir) = create_test_store().await?;
    assert!(!store.delete("does-not-exist").await?);
    Ok(())
}

#[tokio::test]
async fn list_pagination_and_search() -> Result<()> {
    let (store, _dir) = create_test_store().await?;

    for i in 0..5 {
        let session = store.create(None, &[], &[]).await?;
        store
            .update_title(&session.id, &format!("Report {i}"))
            .await?;
    }
    let session = store.create(None, &[], &[]).await?;
    store.update_title(&session.id, "Budget review").await?;

    let page = store.list(1, 4, None).await?;
    assert_eq!(page.total, 6);
    assert_eq!(page.sessions.len(), 4);
    assert!(page.has_more);

    let page2 = store.list(2, 4, None).await?;
    assert_eq!(page2.sessions.len(), 2);
    assert!(!page2.has_more);

    let found = store.list(1, 20, Some("budget")).await?;
    assert_eq!(found.total, 1);
    assert_eq!(found.sessions[0].title, "Budget review");

    let none = store.list(1, 20, Some("zzz")).await?;
    assert_eq!(none.total, 0);
    Ok(())
}

#[tokio::test]
async fn new_session_appears_in_cached_list() -> Result<()> {
    let (store, _dir) = create_test_store().await?;

    // Prime the list cache while empty
    let listing = store.list(1, 20, None).await?;
    assert_eq!(listing.total, 0);

    store.create(None, &[], &[]).await?;

    let listing = store.list(1, 20, None).await?;
    assert_eq!(listing.total, 1);
    Ok(())
}

#[tokio::test]
async fn delete_all_removes_everything() -> Result<()> {
    let (store, _dir) = create_test_store().await?;
    for _ in 0..3 {
        store.create(None, &[], &[]).await?;
    }

    assert_eq!(store.delete_all().await?, 3);
    assert_eq!(store.list(1, 20, None).await?.total, 0);
    Ok(())
}

#[tokio::test]
async fn messages_keep_chart_config() -> Result<()> {
    let (store, _dir) = create_test_store().await?;
    let session = store.create(None, &[], &[]).await?;

    let chart = serde_json::json!({"series": [{"type": "bar"}]});
    store
        .add_message(&session.id, "assistant", "Here is a chart", Some(&chart), None)
        .await?;

    let detail = store.get_detail(&session.id).await?.expect("detail");
    assert_eq!(detail.messages[0].chart_config, Some(chart));
    Ok(())
}
