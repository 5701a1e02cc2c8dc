// ABOUTME: Tests for uploaded file storage and table service lookups
// ABOUTME: Covers save/get/get_many/delete and upload ingestion through the cache
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 TableChat Contributors

use anyhow::Result;
use std::sync::Arc;
use tablechat::cache::TieredCache;
use tablechat::config::CacheConfig;
use tablechat::database::{Database, FileManager};
use tablechat::models::{DatasetKey, UploadedFile};
use tablechat::services::{CsvParser, TableService};
use tempfile::TempDir;

async fn create_db() -> Result<(Database, TempDir)> {
    let dir = TempDir::new()?;
    let db_path = dir.path().join("test.db");
    let db = Database::new(&format!("sqlite:{}", db_path.display())).await?;
    Ok((db, dir))
}

async fn create_service(db: &Database) -> Result<TableService> {
    let cache_config = CacheConfig {
        redis_url: None,
        enable_background_cleanup: false,
        ..CacheConfig::default()
    };
    let cache = Arc::new(TieredCache::new(cache_config).await?);
    Ok(TableService::new(
        cache,
        FileManager::new(db.pool().clone()),
        Arc::new(CsvParser),
    ))
}

fn csv_file(id: &str, filename: &str) -> UploadedFile {
    UploadedFile {
        id: id.to_owned(),
        filename: filename.to_owned(),
        file_type: "csv".to_owned(),
        content: b"city,population\nOslo,700000\nBergen,290000\n".to_vec(),
        columns: vec!["city".to_owned(), "population".to_owned()],
        row_count: 2,
        sheet_names: Vec::new(),
        selected_sheet: None,
        created_at: chrono::Utc::now(),
    }
}

#[tokio::test]
async fn save_and_get_round_trips_the_record() -> Result<()> {
    let (db, _dir) = create_db().await?;
    let files = FileManager::new(db.pool().clone());

    files.save(&csv_file("f1", "cities.csv")).await?;

    let loaded = files.get("f1").await?.expect("file present");
    assert_eq!(loaded.filename, "cities.csv");
    assert_eq!(loaded.columns, vec!["city", "population"]);
    assert_eq!(loaded.row_count, 2);
    assert!(loaded.content.starts_with(b"city,population"));
    Ok(())
}

#[tokio::test]
async fn get_many_skips_unknown_ids() -> Result<()> {
    let (db, _dir) = create_db().await?;
    let files = FileManager::new(db.pool().clone());

    files.save(&csv_file("a", "a.csv")).await?;
    files.save(&csv_file("b", "b.csv")).await?;

    let ids = vec!["a".to_owned(), "missing".to_owned(), "b".to_owned()];
    let mut loaded = files.get_many(&ids).await?;
    loaded.sort_by(|x, y| x.id.cmp(&y.id));

    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0].id, "a");
    assert_eq!(loaded[1].id, "b");

    assert!(files.get_many(&[]).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn delete_removes_the_record() -> Result<()> {
    let (db, _dir) = create_db().await?;
    let files = FileManager::new(db.pool().clone());

    files.save(&csv_file("f1", "cities.csv")).await?;
    assert!(files.delete("f1").await?);
    assert!(files.get("f1").await?.is_none());
    assert!(!files.delete("f1").await?);
    Ok(())
}

#[tokio::test]
async fn ingest_upload_persists_and_serves_from_cache() -> Result<()> {
    let (db, _dir) = create_db().await?;
    let service = create_service(&db).await?;

    let (file, table) = service
        .ingest_upload("sales.csv", "csv", b"q,amount\nq1,10\nq2,20\n".to_vec(), None)
        .await?;
    assert_eq!(table.row_count(), 2);
    assert!(file.sheet_names.is_empty());

    let key = DatasetKey::new(file.id.clone(), None);
    let fetched = service.get_table(&key).await?;
    assert_eq!(fetched, table);
    Ok(())
}

#[tokio::test]
async fn get_table_reparses_after_cache_miss() -> Result<()> {
    let (db, _dir) = create_db().await?;
    let files = FileManager::new(db.pool().clone());
    let service = create_service(&db).await?;

    // Saved directly, so nothing is cached yet
    files.save(&csv_file("raw", "cities.csv")).await?;

    let table = service.get_table(&DatasetKey::parse("raw")).await?;
    assert_eq!(table.columns, vec!["city", "population"]);
    assert_eq!(table.rows[0], vec!["Oslo", "700000"]);
    Ok(())
}

#[tokio::test]
async fn get_table_rejects_unknown_file() -> Result<()> {
    let (db, _dir) = create_db().await?;
    let service = create_service(&db).await?;

    let err = service
        .get_table(&DatasetKey::parse("nope"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not found"));
    Ok(())
}

#[tokio::test]
async fn validate_metadata_checks_files_and_sheets() -> Result<()> {
    let (db, _dir) = create_db().await?;
    let files = FileManager::new(db.pool().clone());
    let service = create_service(&db).await?;

    files.save(&csv_file("f1", "cities.csv")).await?;

    let valid = vec![tablechat::models::FileMetadata {
        file_id: "f1".to_owned(),
        filename: "cities.csv".to_owned(),
        sheet_names: Vec::new(),
        selected_sheets: Vec::new(),
    }];
    service.validate_metadata(&valid).await?;

    let unknown_file = vec![tablechat::models::FileMetadata {
        file_id: "ghost".to_owned(),
        filename: "ghost.csv".to_owned(),
        sheet_names: Vec::new(),
        selected_sheets: Vec::new(),
    }];
    assert!(service.validate_metadata(&unknown_file).await.is_err());

    let bad_sheet = vec![tablechat::models::FileMetadata {
        file_id: "f1".to_owned(),
        filename: "cities.csv".to_owned(),
        sheet_names: Vec::new(),
        selected_sheets: vec!["Sheet1".to_owned()],
    }];
    assert!(service.validate_metadata(&bad_sheet).await.is_err());
    Ok(())
}
