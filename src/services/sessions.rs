// ABOUTME: Session service combining database access with cache coherence
// ABOUTME: Every mutation invalidates the affected cache entries, never refreshes them
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 TableChat Contributors

use crate::cache::{CacheKey, TieredCache};
use crate::database::SessionManager;
use crate::errors::AppResult;
use crate::models::{ChatSession, FileMetadata, SessionDetail, SessionPage, StoredMessage};
use std::sync::Arc;
use tracing::debug;

/// Cache-coherent session access.
///
/// Reads go through the tiered cache; writes hit the database and then
/// delete the stale entries. Deletion rather than refresh keeps a failed
/// cache write from ever serving stale session state.
pub struct SessionStore {
    sessions: SessionManager,
    cache: Arc<TieredCache>,
}

impl SessionStore {
    #[must_use]
    pub fn new(sessions: SessionManager, cache: Arc<TieredCache>) -> Self {
        Self { sessions, cache }
    }

    /// Create a session and drop the cached list pages
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn create(
        &self,
        title: Option<&str>,
        dataset_keys: &[String],
        file_metadata: &[FileMetadata],
    ) -> AppResult<ChatSession> {
        let session = self
            .sessions
            .create(title, dataset_keys, file_metadata)
            .await?;
        self.cache
            .invalidate_pattern(CacheKey::session_list_pattern())
            .await;
        Ok(session)
    }

    /// Get a session with its messages, cache first
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn get_detail(&self, session_id: &str) -> AppResult<Option<SessionDetail>> {
        let cache_key = CacheKey::session_detail(session_id);

        if let Some(detail) = self.cache.get::<SessionDetail>(&cache_key).await {
            debug!("Session detail cache hit for {}", session_id);
            return Ok(Some(detail));
        }

        let Some(detail) = self.sessions.get_with_messages(session_id).await? else {
            return Ok(None);
        };

        self.cache.set(&cache_key, &detail).await;
        Ok(Some(detail))
    }

    /// List sessions, cache first, newest first
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn list(
        &self,
        page: u32,
        limit: u32,
        search: Option<&str>,
    ) -> AppResult<SessionPage> {
        let cache_key = CacheKey::session_list(page, limit, search);

        if let Some(listing) = self.cache.get::<SessionPage>(&cache_key).await {
            debug!("Session list cache hit for page {}", page);
            return Ok(listing);
        }

        let listing = self.sessions.list_paginated(page, limit, search).await?;
        self.cache.set(&cache_key, &listing).await;
        Ok(listing)
    }

    /// Delete a session, dropping its detail entry and the list pages
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn delete(&self, session_id: &str) -> AppResult<bool> {
        let deleted = self.sessions.delete(session_id).await?;
        if deleted {
            self.invalidate_session(session_id).await;
        }
        Ok(deleted)
    }

    /// Delete every session, clearing all session cache entries
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn delete_all(&self) -> AppResult<u64> {
        let count = self.sessions.delete_all().await?;
        self.cache.invalidate_pattern("session:detail:*").await;
        self.cache
            .invalidate_pattern(CacheKey::session_list_pattern())
            .await;
        Ok(count)
    }

    /// Append a message, dropping the session's detail entry.
    ///
    /// List pages are left to expire on their short TTL.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn add_message(
        &self,
        session_id: &str,
        role: &str,
        content: &str,
        chart_config: Option<&serde_json::Value>,
        thinking: Option<&str>,
    ) -> AppResult<StoredMessage> {
        let message = self
            .sessions
            .add_message(session_id, role, content, chart_config, thinking)
            .await?;
        self.invalidate_detail(session_id).await;
        Ok(message)
    }

    /// Rename a session
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn update_title(&self, session_id: &str, title: &str) -> AppResult<bool> {
        let updated = self.sessions.update_title(session_id, title).await?;
        if updated {
            self.invalidate_session(session_id).await;
        }
        Ok(updated)
    }

    /// Replace the session's dataset keys
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn update_dataset_keys(
        &self,
        session_id: &str,
        dataset_keys: &[String],
    ) -> AppResult<bool> {
        let updated = self
            .sessions
            .update_dataset_keys(session_id, dataset_keys)
            .await?;
        if updated {
            self.invalidate_session(session_id).await;
        }
        Ok(updated)
    }

    /// Replace the session's file attachment metadata
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub async fn update_file_metadata(
        &self,
        session_id: &str,
        file_metadata: &[FileMetadata],
    ) -> AppResult<bool> {
        let updated = self
            .sessions
            .update_file_metadata(session_id, file_metadata)
            .await?;
        if updated {
            self.invalidate_session(session_id).await;
        }
        Ok(updated)
    }

    /// Drop a session's detail entry after an out-of-band message change
    pub async fn invalidate_detail(&self, session_id: &str) {
        self.cache
            .invalidate(&CacheKey::session_detail(session_id))
            .await;
    }

    /// Drop both the detail entry and the list pages.
    ///
    /// List pages are ordered by updated_at, so any session mutation can
    /// reshuffle them.
    async fn invalidate_session(&self, session_id: &str) {
        self.cache
            .invalidate(&CacheKey::session_detail(session_id))
            .await;
        self.cache
            .invalidate_pattern(CacheKey::session_list_pattern())
            .await;
    }
}
