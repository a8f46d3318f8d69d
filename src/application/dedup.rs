//! Exact-duplicate detection against the produced-item history.

use std::sync::Arc;

use crate::application::repos::{HistoryRepo, RepoError};
use crate::cache::digest_hex;

pub struct DuplicateGuard {
    history: Arc<dyn HistoryRepo>,
}

impl DuplicateGuard {
    pub fn new(history: Arc<dyn HistoryRepo>) -> Self {
        Self { history }
    }

    /// Stable identity of a source locator.
    pub fn source_hash(locator: &str) -> String {
        digest_hex(locator.trim())
    }

    /// Identity of a produced body, used for content-level dedup.
    pub fn content_hash(body: &str) -> String {
        digest_hex(body.trim())
    }

    pub async fn is_duplicate(&self, source_hash: &str) -> Result<bool, RepoError> {
        self.history.source_exists(source_hash).await
    }

    pub async fn is_duplicate_content(&self, content_hash: &str) -> Result<bool, RepoError> {
        self.history.content_exists(content_hash).await
    }
}
