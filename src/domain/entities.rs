//! Domain entities mirrored from persistent storage.

use std::path::PathBuf;

use serde::Serialize;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::domain::types::{CacheDomain, RoutingMode};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    pub domain: CacheDomain,
    pub fingerprint: String,
    pub input_summary: String,
    pub payload: String,
    pub backing_file: Option<PathBuf>,
    pub hit_count: u64,
    pub last_hit_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub valid: bool,
}

impl CacheEntry {
    /// Valid and not yet expired at `now`. Backing files are checked by the cache itself.
    pub fn is_live_at(&self, now: OffsetDateTime) -> bool {
        self.valid && self.expires_at > now
    }
}

/// Insert-or-overwrite command for a cache entry; hit accounting starts from zero.
#[derive(Debug, Clone)]
pub struct NewCacheEntry {
    pub domain: CacheDomain,
    pub fingerprint: String,
    pub input_summary: String,
    pub payload: String,
    pub backing_file: Option<PathBuf>,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

/// Aggregate counters for one cache domain as reported by a store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheDomainCounts {
    pub entries: u64,
    pub entries_with_hits: u64,
    pub payload_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageRecord {
    pub service: String,
    pub day: Date,
    pub calls: u64,
    pub tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProducedItemRecord {
    pub id: Uuid,
    pub source_hash: String,
    pub content_hash: String,
    pub content_snippet: String,
    pub locator: String,
    pub title: String,
    pub source_name: String,
    pub routed_locator: String,
    pub routing_mode: RoutingMode,
    pub quality_score: f64,
    pub originality_score: f64,
    pub produced_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingRecord {
    pub key: String,
    pub value: String,
}

/// A candidate item pulled from discovery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub locator: String,
    pub title: String,
    pub source_name: String,
    pub summary: String,
}
