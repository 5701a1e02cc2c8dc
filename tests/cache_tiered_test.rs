// ABOUTME: Tests for the tiered cache running in local-only mode
// ABOUTME: Covers key independence, invalidation, and degraded operation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 TableChat Contributors

use anyhow::Result;
use tablechat::cache::{CacheKey, TieredCache};
use tablechat::config::CacheConfig;
use tablechat::models::Table;

/// Local-only cache with background cleanup disabled for tests
async fn create_test_cache() -> Result<TieredCache> {
    let config = CacheConfig {
        redis_url: None,
        enable_background_cleanup: false,
        ..CacheConfig::default()
    };
    Ok(TieredCache::new(config).await?)
}

fn sample_table(marker: &str) -> Table {
    Table::new(
        vec!["id".into(), "value".into()],
        vec![vec!["1".into(), marker.into()]],
    )
}

#[tokio::test]
async fn set_and_get_round_trip() -> Result<()> {
    let cache = create_test_cache().await?;
    let key = CacheKey::table("f1");
    let table = sample_table("alpha");

    cache.set(&key, &table).await;

    let cached: Option<Table> = cache.get(&key).await;
    assert_eq!(cached, Some(table));
    Ok(())
}

#[tokio::test]
async fn missing_key_is_a_miss() -> Result<()> {
    let cache = create_test_cache().await?;
    let cached: Option<Table> = cache.get(&CacheKey::table("nope")).await;
    assert_eq!(cached, None);
    Ok(())
}

#[tokio::test]
async fn file_and_sheet_keys_are_independent() -> Result<()> {
    let cache = create_test_cache().await?;
    let whole_file = CacheKey::table("f1");
    let sheet = CacheKey::table("f1:Sheet2");

    cache.set(&whole_file, &sample_table("whole")).await;
    cache.set(&sheet, &sample_table("sheet")).await;

    let a: Option<Table> = cache.get(&whole_file).await;
    let b: Option<Table> = cache.get(&sheet).await;
    assert_eq!(a.unwrap().rows[0][1], "whole");
    assert_eq!(b.unwrap().rows[0][1], "sheet");

    cache.invalidate(&whole_file).await;
    let a: Option<Table> = cache.get(&whole_file).await;
    let b: Option<Table> = cache.get(&sheet).await;
    assert!(a.is_none());
    assert!(b.is_some());
    Ok(())
}

#[tokio::test]
async fn pattern_invalidation_spares_other_namespaces() -> Result<()> {
    let cache = create_test_cache().await?;
    let list_page = CacheKey::session_list(1, 20, None);
    let detail = CacheKey::session_detail("abc");
    let table = CacheKey::table("f1");

    cache.set(&list_page, &"page-one".to_owned()).await;
    cache.set(&detail, &"detail".to_owned()).await;
    cache.set(&table, &sample_table("t")).await;

    cache
        .invalidate_pattern(CacheKey::session_list_pattern())
        .await;

    let page: Option<String> = cache.get(&list_page).await;
    let detail_value: Option<String> = cache.get(&detail).await;
    let table_value: Option<Table> = cache.get(&table).await;
    assert!(page.is_none());
    assert!(detail_value.is_some());
    assert!(table_value.is_some());
    Ok(())
}

#[tokio::test]
async fn local_only_mode_reports_healthy() -> Result<()> {
    let cache = create_test_cache().await?;
    assert!(!cache.has_redis());
    assert!(cache.health_check().await.is_ok());
    Ok(())
}

#[tokio::test]
async fn unreachable_redis_degrades_to_local() -> Result<()> {
    let config = CacheConfig {
        redis_url: Some("redis://127.0.0.1:1/".to_owned()),
        enable_background_cleanup: false,
        redis_connection: tablechat::config::RedisConnectionConfig {
            connection_timeout_secs: 1,
            initial_connection_retries: 0,
            initial_retry_delay_ms: 10,
            ..tablechat::config::RedisConnectionConfig::default()
        },
        ..CacheConfig::default()
    };

    let cache = TieredCache::new(config).await?;
    assert!(!cache.has_redis());

    // Degraded mode still serves reads and writes
    let key = CacheKey::table("f1");
    cache.set(&key, &sample_table("degraded")).await;
    let cached: Option<Table> = cache.get(&key).await;
    assert!(cached.is_some());
    Ok(())
}

#[tokio::test]
async fn clear_all_empties_the_cache() -> Result<()> {
    let cache = create_test_cache().await?;
    let key = CacheKey::table("f1");
    cache.set(&key, &sample_table("x")).await;

    cache.clear_all().await?;

    let cached: Option<Table> = cache.get(&key).await;
    assert!(cached.is_none());
    Ok(())
}
