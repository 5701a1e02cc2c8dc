// ABOUTME: Two-tier cache: Redis shared tier with an in-process fallback tier
// ABOUTME: Reads hit local first; writes prefer Redis and fall back locally on failure
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 TableChat Contributors

use super::{CacheKey, CacheProvider, InMemoryCache, RedisCache};
use crate::config::{CacheConfig, CacheTtlConfig};
use crate::errors::AppResult;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Redis-first cache with a local in-process fallback.
///
/// Degradation never surfaces to callers: Redis failures are logged and
/// treated as misses on read, and writes land in the local tier instead.
/// A given write lives in exactly one tier, so a later successful Redis
/// write also drops any stale local copy.
#[derive(Clone)]
pub struct TieredCache {
    local: InMemoryCache,
    redis: Option<RedisCache>,
    ttl: CacheTtlConfig,
}

impl TieredCache {
    /// Create the tiered cache from configuration.
    ///
    /// When `redis_url` is unset, or Redis is unreachable at startup, the
    /// cache runs local-only. That is a degraded mode, not an error.
    ///
    /// # Errors
    ///
    /// Returns an error only if the local tier fails to initialize.
    pub async fn new(config: CacheConfig) -> AppResult<Self> {
        let local = InMemoryCache::new(config.clone()).await?;
        let ttl = config.ttl.clone();

        let redis = if config.redis_url.is_some() {
            match RedisCache::new(config).await {
                Ok(redis) => Some(redis),
                Err(e) => {
                    warn!("Redis unavailable, running with local cache only: {}", e);
                    None
                }
            }
        } else {
            info!("No Redis URL configured, running with local cache only");
            None
        };

        Ok(Self { local, redis, ttl })
    }

    /// Whether the shared Redis tier is attached
    #[must_use]
    pub const fn has_redis(&self) -> bool {
        self.redis.is_some()
    }

    /// Look up a value, checking the local tier before Redis.
    ///
    /// Redis errors are logged and treated as misses.
    pub async fn get<T: for<'de> Deserialize<'de>>(&self, key: &CacheKey) -> Option<T> {
        match self.local.get(key).await {
            Ok(Some(value)) => return Some(value),
            Ok(None) => {}
            Err(e) => warn!("Local cache read failed for {}: {}", key, e),
        }

        if let Some(redis) = &self.redis {
            match redis.get(key).await {
                Ok(Some(value)) => return Some(value),
                Ok(None) => {}
                Err(e) => warn!("Redis read failed for {}, treating as miss: {}", key, e),
            }
        }

        None
    }

    /// Store a value with the TTL configured for its key type.
    ///
    /// Prefers Redis; on Redis failure the value is kept locally instead.
    /// Failures in both tiers are logged, never surfaced.
    pub async fn set<T: Serialize + Send + Sync>(&self, key: &CacheKey, value: &T) {
        let ttl = key.ttl(&self.ttl);

        if let Some(redis) = &self.redis {
            match redis.set(key, value, ttl).await {
                Ok(()) => {
                    // The write now lives in Redis; drop any stale local copy
                    if let Err(e) = self.local.invalidate(key).await {
                        debug!("Local invalidation after Redis write failed: {}", e);
                    }
                    return;
                }
                Err(e) => {
                    warn!("Redis write failed for {}, falling back to local: {}", key, e);
                }
            }
        }

        if let Err(e) = self.local.set(key, value, ttl).await {
            warn!("Local cache write failed for {}: {}", key, e);
        }
    }

    /// Delete one entry from both tiers, best effort.
    pub async fn invalidate(&self, key: &CacheKey) {
        if let Err(e) = self.local.invalidate(key).await {
            warn!("Local invalidation failed for {}: {}", key, e);
        }
        if let Some(redis) = &self.redis {
            if let Err(e) = redis.invalidate(key).await {
                warn!("Redis invalidation failed for {}: {}", key, e);
            }
        }
    }

    /// Delete all entries matching a glob pattern from both tiers, best effort.
    pub async fn invalidate_pattern(&self, pattern: &str) {
        match self.local.invalidate_pattern(pattern).await {
            Ok(n) if n > 0 => debug!("Invalidated {} local entries matching '{}'", n, pattern),
            Ok(_) => {}
            Err(e) => warn!("Local pattern invalidation failed for '{}': {}", pattern, e),
        }
        if let Some(redis) = &self.redis {
            match redis.invalidate_pattern(pattern).await {
                Ok(n) if n > 0 => debug!("Invalidated {} Redis entries matching '{}'", n, pattern),
                Ok(_) => {}
                Err(e) => warn!("Redis pattern invalidation failed for '{}': {}", pattern, e),
            }
        }
    }

    /// Report backend health: `Ok` in local-only mode, Redis PING otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error when the attached Redis tier fails its PING.
    pub async fn health_check(&self) -> AppResult<()> {
        match &self.redis {
            Some(redis) => redis.health_check().await,
            None => self.local.health_check().await,
        }
    }

    /// Clear both tiers
    ///
    /// # Errors
    ///
    /// Returns an error if either tier fails to clear.
    pub async fn clear_all(&self) -> AppResult<()> {
        self.local.clear_all().await?;
        if let Some(redis) = &self.redis {
            redis.clear_all().await?;
        }
        Ok(())
    }
}
