// ABOUTME: Environment-driven server configuration
// ABOUTME: Covers HTTP, database, Redis, cache TTLs, rate limits, and LLM settings
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 TableChat Contributors

use serde::{Deserialize, Serialize};
use std::env;

use crate::errors::AppResult;

/// Default TTL for cached tables (1 hour)
pub const TTL_TABLE_SECS: u64 = 3600;
/// Default TTL for cached session details (30 minutes)
pub const TTL_SESSION_DETAIL_SECS: u64 = 1800;
/// Default TTL for cached session list pages (short; lists tolerate staleness)
pub const TTL_SESSION_LIST_SECS: u64 = 60;
/// Default maximum entries in the in-process fallback tier
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 1000;
/// Default cleanup interval for expired local entries (5 minutes)
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 300;
/// Default cap on concurrently open model streams
pub const DEFAULT_STREAM_CONCURRENCY: usize = 10;

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Redis connection and retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConnectionConfig {
    /// Timeout for establishing a connection, in seconds
    pub connection_timeout_secs: u64,
    /// Timeout for individual command responses, in seconds
    pub response_timeout_secs: u64,
    /// Retries performed at startup before giving up on Redis
    pub initial_connection_retries: u32,
    /// Initial delay between startup retries, in milliseconds
    pub initial_retry_delay_ms: u64,
    /// Upper bound on retry delay, in milliseconds
    pub max_retry_delay_ms: u64,
    /// Exponent base for the connection manager's backoff
    pub retry_exponent_base: u64,
    /// Reconnection retries performed by the connection manager
    pub reconnection_retries: usize,
}

impl Default for RedisConnectionConfig {
    fn default() -> Self {
        Self {
            connection_timeout_secs: 5,
            response_timeout_secs: 2,
            initial_connection_retries: 3,
            initial_retry_delay_ms: 200,
            max_retry_delay_ms: 5000,
            retry_exponent_base: 2,
            reconnection_retries: 6,
        }
    }
}

impl RedisConnectionConfig {
    /// Load Redis connection tuning from environment
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            connection_timeout_secs: env_parse(
                "REDIS_CONNECT_TIMEOUT_SECS",
                defaults.connection_timeout_secs,
            ),
            response_timeout_secs: env_parse(
                "REDIS_RESPONSE_TIMEOUT_SECS",
                defaults.response_timeout_secs,
            ),
            initial_connection_retries: env_parse(
                "REDIS_INITIAL_RETRIES",
                defaults.initial_connection_retries,
            ),
            initial_retry_delay_ms: env_parse(
                "REDIS_INITIAL_RETRY_DELAY_MS",
                defaults.initial_retry_delay_ms,
            ),
            max_retry_delay_ms: env_parse("REDIS_MAX_RETRY_DELAY_MS", defaults.max_retry_delay_ms),
            retry_exponent_base: defaults.retry_exponent_base,
            reconnection_retries: env_parse(
                "REDIS_RECONNECTION_RETRIES",
                defaults.reconnection_retries,
            ),
        }
    }
}

/// Cache TTL configuration for the different cached resource types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheTtlConfig {
    /// Cached table TTL in seconds
    pub table_secs: u64,
    /// Cached session detail TTL in seconds
    pub session_detail_secs: u64,
    /// Cached session list page TTL in seconds
    pub session_list_secs: u64,
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self {
            table_secs: TTL_TABLE_SECS,
            session_detail_secs: TTL_SESSION_DETAIL_SECS,
            session_list_secs: TTL_SESSION_LIST_SECS,
        }
    }
}

impl CacheTtlConfig {
    /// Load TTL configuration from environment
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            table_secs: env_parse("CACHE_TTL_TABLE_SECS", defaults.table_secs),
            session_detail_secs: env_parse(
                "CACHE_TTL_SESSION_DETAIL_SECS",
                defaults.session_detail_secs,
            ),
            session_list_secs: env_parse("CACHE_TTL_SESSION_LIST_SECS", defaults.session_list_secs),
        }
    }
}

/// Cache configuration for Redis and the in-process fallback tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Redis URL for the shared tier (unset means local-only operation)
    pub redis_url: Option<String>,
    /// Maximum number of entries in the local tier
    pub max_entries: usize,
    /// Cleanup interval for expired local entries, in seconds
    pub cleanup_interval_secs: u64,
    /// Enable the background cleanup task (disable in tests)
    pub enable_background_cleanup: bool,
    /// Redis connection configuration
    pub redis_connection: RedisConnectionConfig,
    /// Cache TTL configuration
    pub ttl: CacheTtlConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            cleanup_interval_secs: DEFAULT_CLEANUP_INTERVAL_SECS,
            enable_background_cleanup: true,
            redis_connection: RedisConnectionConfig::default(),
            ttl: CacheTtlConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Load cache configuration from environment
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            redis_url: env::var("REDIS_URL").ok(),
            max_entries: env_parse("CACHE_MAX_ENTRIES", DEFAULT_CACHE_MAX_ENTRIES),
            cleanup_interval_secs: env_parse(
                "CACHE_CLEANUP_INTERVAL_SECS",
                DEFAULT_CLEANUP_INTERVAL_SECS,
            ),
            enable_background_cleanup: true,
            redis_connection: RedisConnectionConfig::from_env(),
            ttl: CacheTtlConfig::from_env(),
        }
    }
}

/// Per-route fixed-window rate limit
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimit {
    /// Requests allowed per window
    pub limit: u32,
    /// Window length in seconds
    pub window_secs: u64,
}

/// LLM endpoint configuration (OpenAI-compatible API)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the chat-completions endpoint
    pub base_url: String,
    /// Model identifier sent with every request
    pub model: String,
    /// Optional bearer token
    pub api_key: Option<String>,
}

impl LlmConfig {
    /// Load LLM configuration from environment
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            base_url: env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| "https://api.deepseek.com/v1".to_owned()),
            model: env::var("LLM_MODEL").unwrap_or_else(|_| "deepseek-chat".to_owned()),
            api_key: env::var("LLM_API_KEY").ok(),
        }
    }
}

/// Top-level server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP listen port
    pub http_port: u16,
    /// Database connection URL
    pub database_url: String,
    /// Cache configuration
    pub cache: CacheConfig,
    /// LLM endpoint configuration
    pub llm: LlmConfig,
    /// Maximum number of concurrently open model streams
    pub stream_concurrency: usize,
    /// Rate limit applied to file uploads
    pub upload_rate_limit: RateLimit,
    /// Rate limit applied to streamed chat requests
    pub chat_stream_rate_limit: RateLimit,
}

impl ServerConfig {
    /// Load server configuration from environment variables
    ///
    /// # Errors
    ///
    /// Currently infallible; kept fallible for parity with future validation.
    pub fn from_env() -> AppResult<Self> {
        Ok(Self {
            http_port: env_parse("HTTP_PORT", 8000),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./data/tablechat.db".to_owned()),
            cache: CacheConfig::from_env(),
            llm: LlmConfig::from_env(),
            stream_concurrency: env_parse("STREAM_CONCURRENCY", DEFAULT_STREAM_CONCURRENCY),
            upload_rate_limit: RateLimit {
                limit: env_parse("UPLOAD_RATE_LIMIT", 10),
                window_secs: 60,
            },
            chat_stream_rate_limit: RateLimit {
                limit: env_parse("CHAT_STREAM_RATE_LIMIT", 20),
                window_secs: 60,
            },
        })
    }

    /// One-line configuration summary for startup logging
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "port={} db={} redis={} model={} stream_concurrency={}",
            self.http_port,
            self.database_url,
            self.cache.redis_url.as_deref().unwrap_or("(local only)"),
            self.llm.model,
            self.stream_concurrency,
        )
    }
}
