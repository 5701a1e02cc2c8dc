// ABOUTME: Cache abstraction for tables and session data
// ABOUTME: Pluggable backend support (in-memory, Redis) plus the tiered facade
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 TableChat Contributors

/// In-memory cache implementation
pub mod memory;
/// Redis cache implementation
pub mod redis;
/// Redis-first, local-fallback tiered facade
pub mod tiered;

use crate::config::{CacheConfig, CacheTtlConfig};
use crate::errors::AppResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub use memory::InMemoryCache;
pub use redis::RedisCache;
pub use tiered::TieredCache;

/// Namespace prefix applied to every key stored in Redis
pub const CACHE_KEY_PREFIX: &str = "tablechat:";

/// Cache provider trait for pluggable backend implementations
#[async_trait::async_trait]
pub trait CacheProvider: Send + Sync + Clone {
    /// Create new cache instance with configuration
    ///
    /// # Errors
    ///
    /// Returns an error if cache initialization fails
    async fn new(config: CacheConfig) -> AppResult<Self>
    where
        Self: Sized;

    /// Store value in cache with TTL
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or storage fails
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: Duration,
    ) -> AppResult<()>;

    /// Retrieve value from cache
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails
    async fn get<T: for<'de> Deserialize<'de>>(&self, key: &CacheKey) -> AppResult<Option<T>>;

    /// Remove single cache entry
    ///
    /// # Errors
    ///
    /// Returns an error if invalidation fails
    async fn invalidate(&self, key: &CacheKey) -> AppResult<()>;

    /// Remove all cache entries matching pattern (e.g., "sessions:list:*")
    ///
    /// # Errors
    ///
    /// Returns an error if pattern invalidation fails
    async fn invalidate_pattern(&self, pattern: &str) -> AppResult<u64>;

    /// Check if key exists in cache
    ///
    /// # Errors
    ///
    /// Returns an error if existence check fails
    async fn exists(&self, key: &CacheKey) -> AppResult<bool>;

    /// Verify cache backend is healthy
    ///
    /// # Errors
    ///
    /// Returns an error if health check fails
    async fn health_check(&self) -> AppResult<()>;

    /// Clear all cache entries (for testing/admin)
    ///
    /// # Errors
    ///
    /// Returns an error if clear operation fails
    async fn clear_all(&self) -> AppResult<()>;
}

/// Typed cache keys for each cached resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// A parsed table, keyed by dataset key (`file_id` or `file_id:sheet`)
    Table {
        /// Dataset key in string form, stored verbatim
        dataset_key: String,
    },
    /// A session with its full message history
    SessionDetail {
        /// Session id
        session_id: String,
    },
    /// One page of the session list
    SessionList {
        /// Page number
        page: u32,
        /// Page size
        limit: u32,
        /// Search filter, empty string when absent
        search: String,
    },
}

impl CacheKey {
    #[must_use]
    pub fn table(dataset_key: impl Into<String>) -> Self {
        Self::Table {
            dataset_key: dataset_key.into(),
        }
    }

    #[must_use]
    pub fn session_detail(session_id: impl Into<String>) -> Self {
        Self::SessionDetail {
            session_id: session_id.into(),
        }
    }

    #[must_use]
    pub fn session_list(page: u32, limit: u32, search: Option<&str>) -> Self {
        Self::SessionList {
            page,
            limit,
            search: search.unwrap_or("").to_owned(),
        }
    }

    /// Pattern matching every cached session list page
    #[must_use]
    pub fn session_list_pattern() -> &'static str {
        "sessions:list:*"
    }

    /// TTL for this key per the configured TTL table
    #[must_use]
    pub const fn ttl(&self, ttl_config: &CacheTtlConfig) -> Duration {
        match self {
            Self::Table { .. } => Duration::from_secs(ttl_config.table_secs),
            Self::SessionDetail { .. } => Duration::from_secs(ttl_config.session_detail_secs),
            Self::SessionList { .. } => Duration::from_secs(ttl_config.session_list_secs),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table { dataset_key } => write!(f, "df:{dataset_key}"),
            Self::SessionDetail { session_id } => write!(f, "session:detail:{session_id}"),
            Self::SessionList {
                page,
                limit,
                search,
            } => write!(f, "sessions:list:{page}:{limit}:{search}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_formats() {
        assert_eq!(CacheKey::table("f1").to_string(), "df:f1");
        assert_eq!(CacheKey::table("f1:Sheet2").to_string(), "df:f1:Sheet2");
        assert_eq!(
            CacheKey::session_detail("abc").to_string(),
            "session:detail:abc"
        );
        assert_eq!(
            CacheKey::session_list(1, 20, None).to_string(),
            "sessions:list:1:20:"
        );
        assert_eq!(
            CacheKey::session_list(2, 10, Some("budget")).to_string(),
            "sessions:list:2:10:budget"
        );
    }

    #[test]
    fn list_pattern_matches_list_keys() {
        let pattern = glob::Pattern::new(CacheKey::session_list_pattern()).unwrap();
        assert!(pattern.matches(&CacheKey::session_list(1, 20, None).to_string()));
        assert!(pattern.matches(&CacheKey::session_list(3, 50, Some("q")).to_string()));
        assert!(!pattern.matches(&CacheKey::session_detail("abc").to_string()));
        assert!(!pattern.matches(&CacheKey::table("f1").to_string()));
    }
}
