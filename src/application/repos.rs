//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::{Date, OffsetDateTime};

use crate::domain::entities::{
    CacheDomainCounts, CacheEntry, NewCacheEntry, ProducedItemRecord, UsageRecord,
};
use crate::domain::types::CacheDomain;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Storage for the per-domain cache tables.
#[async_trait]
pub trait CacheRepo: Send + Sync {
    async fn find_entry(
        &self,
        domain: CacheDomain,
        fingerprint: &str,
    ) -> Result<Option<CacheEntry>, RepoError>;

    /// Insert or overwrite, resetting hit accounting and validity.
    async fn upsert_entry(&self, entry: NewCacheEntry) -> Result<(), RepoError>;

    /// Atomically bump `hit_count` and set `last_hit_at` when the entry is still valid and
    /// unexpired at `at`. Returns the updated entry, or `None` when nothing qualified.
    async fn record_hit(
        &self,
        domain: CacheDomain,
        fingerprint: &str,
        at: OffsetDateTime,
    ) -> Result<Option<CacheEntry>, RepoError>;

    /// Mark an entry invalid without removing it. Returns whether a row was touched.
    async fn invalidate_entry(&self, domain: CacheDomain, fingerprint: &str)
    -> Result<bool, RepoError>;

    async fn delete_entry(&self, domain: CacheDomain, fingerprint: &str)
    -> Result<bool, RepoError>;

    /// Entries whose `expires_at` is at or before `now`.
    async fn list_expired(
        &self,
        domain: CacheDomain,
        now: OffsetDateTime,
    ) -> Result<Vec<CacheEntry>, RepoError>;

    async fn list_backing_files(&self, domain: CacheDomain) -> Result<Vec<String>, RepoError>;

    async fn domain_counts(&self, domain: CacheDomain) -> Result<CacheDomainCounts, RepoError>;

    /// Remove every entry of the domain, returning how many rows were deleted.
    async fn clear_domain(&self, domain: CacheDomain) -> Result<u64, RepoError>;
}

/// Persisted last-call times and per-day usage tallies for external services.
#[async_trait]
pub trait RateLimitRepo: Send + Sync {
    async fn last_request_at(&self, service: &str) -> Result<Option<OffsetDateTime>, RepoError>;

    async fn mark_request(&self, service: &str, at: OffsetDateTime) -> Result<(), RepoError>;

    /// Additive upsert of the `(service, day)` usage row.
    async fn record_usage(
        &self,
        service: &str,
        day: Date,
        calls: u64,
        tokens: u64,
    ) -> Result<(), RepoError>;

    async fn usage_for_day(&self, service: &str, day: Date)
    -> Result<Option<UsageRecord>, RepoError>;

    /// Delete usage rows strictly older than `before`.
    async fn prune_usage(&self, before: Date) -> Result<u64, RepoError>;
}

/// Append-only record of produced items.
#[async_trait]
pub trait HistoryRepo: Send + Sync {
    async fn source_exists(&self, source_hash: &str) -> Result<bool, RepoError>;

    async fn content_exists(&self, content_hash: &str) -> Result<bool, RepoError>;

    /// Insert a record unless its source hash is already present.
    /// Returns `false` when the insert was skipped.
    async fn insert_produced(&self, record: ProducedItemRecord) -> Result<bool, RepoError>;

    /// Records produced at or after `since`, newest first, at most `limit` rows.
    async fn recent_produced(
        &self,
        since: OffsetDateTime,
        limit: usize,
    ) -> Result<Vec<ProducedItemRecord>, RepoError>;

    /// Delete records produced strictly before `before`.
    async fn prune_produced(&self, before: OffsetDateTime) -> Result<u64, RepoError>;
}

/// Durable key/value settings consulted first by the settings cascade.
#[async_trait]
pub trait SettingsRepo: Send + Sync {
    async fn get_setting(&self, key: &str) -> Result<Option<String>, RepoError>;

    async fn put_setting(&self, key: &str, value: &str) -> Result<(), RepoError>;
}
