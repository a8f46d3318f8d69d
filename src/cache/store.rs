//! Keyed TTL cache over a [`CacheRepo`].
//!
//! One `KeyedCache` exists per [`CacheDomain`]. Lookups never purge: expired and invalid
//! rows stay in place until the retention sweeper removes them.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::{debug, warn};

use crate::application::clock::{Clock, saturating_after};
use crate::application::repos::{CacheRepo, RepoError};
use crate::domain::article::GeneratedArticle;
use crate::domain::entities::NewCacheEntry;
use crate::domain::types::CacheDomain;
use crate::infra::files::{backing_file_exists, backing_file_len, remove_backing_file};

use super::keys::{fingerprint, input_summary};

const SOURCE: &str = "cache::store";
const METRIC_CACHE_HIT: &str = "rotativa_cache_hit_total";
const METRIC_CACHE_MISS: &str = "rotativa_cache_miss_total";
const METRIC_CACHE_INVALIDATE: &str = "rotativa_cache_invalidate_total";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("failed to encode cache payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Values that can be stored in a [`KeyedCache`].
pub trait CachePayload: Serialize + DeserializeOwned + Send + Sync {
    /// File on disk owned by this payload, if any.
    fn backing_file(&self) -> Option<&Path> {
        None
    }
}

impl CachePayload for String {}

impl CachePayload for GeneratedArticle {}

/// Reference to a generated asset file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRef {
    pub path: PathBuf,
}

impl CachePayload for AssetRef {
    fn backing_file(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

/// A successful lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit<T> {
    pub fingerprint: String,
    pub payload: T,
    pub hit_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub domain: CacheDomain,
    pub count: u64,
    pub entries_with_hits: u64,
    /// Share of entries that were hit at least once; `0.0` for an empty domain.
    pub hit_rate: f64,
    pub total_size_estimate: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MissReason {
    Absent,
    Expired,
    Invalid,
    MissingFile,
    Corrupt,
}

impl MissReason {
    fn as_str(self) -> &'static str {
        match self {
            MissReason::Absent => "absent",
            MissReason::Expired => "expired",
            MissReason::Invalid => "invalid",
            MissReason::MissingFile => "missing_file",
            MissReason::Corrupt => "corrupt",
        }
    }
}

pub struct KeyedCache<T> {
    domain: CacheDomain,
    ttl: Duration,
    repo: Arc<dyn CacheRepo>,
    clock: Arc<dyn Clock>,
    _payload: PhantomData<fn() -> T>,
}

impl<T> Clone for KeyedCache<T> {
    fn clone(&self) -> Self {
        Self {
            domain: self.domain,
            ttl: self.ttl,
            repo: Arc::clone(&self.repo),
            clock: Arc::clone(&self.clock),
            _payload: PhantomData,
        }
    }
}

impl<T: CachePayload> KeyedCache<T> {
    pub fn new(
        domain: CacheDomain,
        ttl: Duration,
        repo: Arc<dyn CacheRepo>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            domain,
            ttl,
            repo,
            clock,
            _payload: PhantomData,
        }
    }

    pub fn domain(&self) -> CacheDomain {
        self.domain
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn fingerprint(&self, fields: &[&str]) -> String {
        fingerprint(fields)
    }

    /// Look up the entry for `fields`, recording a hit when it is live.
    pub async fn get(&self, fields: &[&str]) -> Result<Option<CacheHit<T>>, CacheError> {
        let key = fingerprint(fields);
        self.get_by_fingerprint(&key).await
    }

    pub async fn get_by_fingerprint(
        &self,
        key: &str,
    ) -> Result<Option<CacheHit<T>>, CacheError> {
        let now = self.clock.now();
        let Some(entry) = self.repo.find_entry(self.domain, key).await? else {
            return Ok(self.miss(key, MissReason::Absent));
        };

        if !entry.valid {
            return Ok(self.miss(key, MissReason::Invalid));
        }
        if entry.expires_at <= now {
            return Ok(self.miss(key, MissReason::Expired));
        }
        if self.domain.requires_backing_file() {
            let present = match entry.backing_file.as_deref() {
                Some(path) => backing_file_exists(path).await,
                None => false,
            };
            if !present {
                return Ok(self.miss(key, MissReason::MissingFile));
            }
        }

        let payload: T = match serde_json::from_str(&entry.payload) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(
                    target = SOURCE,
                    domain = %self.domain,
                    fingerprint = key,
                    error = %err,
                    "invalidating undecodable cache entry"
                );
                self.repo.invalidate_entry(self.domain, key).await?;
                counter!(METRIC_CACHE_INVALIDATE, "domain" => self.domain.as_str()).increment(1);
                return Ok(self.miss(key, MissReason::Corrupt));
            }
        };

        match self.repo.record_hit(self.domain, key, now).await? {
            Some(updated) => {
                counter!(METRIC_CACHE_HIT, "domain" => self.domain.as_str()).increment(1);
                debug!(
                    target = SOURCE,
                    domain = %self.domain,
                    fingerprint = key,
                    hit_count = updated.hit_count,
                    "cache hit"
                );
                Ok(Some(CacheHit {
                    fingerprint: key.to_string(),
                    payload,
                    hit_count: updated.hit_count,
                }))
            }
            // Expired or invalidated between the read and the hit update.
            None => Ok(self.miss(key, MissReason::Expired)),
        }
    }

    /// Insert or overwrite the entry for `fields`. Returns the fingerprint.
    pub async fn put(
        &self,
        fields: &[&str],
        payload: &T,
        ttl_override: Option<Duration>,
    ) -> Result<String, CacheError> {
        let key = fingerprint(fields);
        let encoded = serde_json::to_string(payload)?;
        let created_at = self.clock.now();
        let expires_at = saturating_after(created_at, ttl_override.unwrap_or(self.ttl));

        self.repo
            .upsert_entry(NewCacheEntry {
                domain: self.domain,
                fingerprint: key.clone(),
                input_summary: input_summary(fields),
                payload: encoded,
                backing_file: payload.backing_file().map(Path::to_path_buf),
                created_at,
                expires_at,
            })
            .await?;

        debug!(
            target = SOURCE,
            domain = %self.domain,
            fingerprint = key.as_str(),
            "cache entry stored"
        );
        Ok(key)
    }

    /// Flag an entry as invalid; it stays in storage until swept or cleared.
    pub async fn invalidate(&self, key: &str) -> Result<bool, CacheError> {
        let touched = self.repo.invalidate_entry(self.domain, key).await?;
        if touched {
            counter!(METRIC_CACHE_INVALIDATE, "domain" => self.domain.as_str()).increment(1);
        }
        Ok(touched)
    }

    pub async fn stats(&self) -> Result<CacheStats, CacheError> {
        let counts = self.repo.domain_counts(self.domain).await?;
        let mut file_bytes = 0u64;
        for path in self.repo.list_backing_files(self.domain).await? {
            file_bytes += backing_file_len(Path::new(&path)).await.unwrap_or(0);
        }

        let hit_rate = if counts.entries == 0 {
            0.0
        } else {
            counts.entries_with_hits as f64 / counts.entries as f64
        };

        Ok(CacheStats {
            domain: self.domain,
            count: counts.entries,
            entries_with_hits: counts.entries_with_hits,
            hit_rate,
            total_size_estimate: counts.payload_bytes + file_bytes,
        })
    }

    /// Delete every entry in the domain together with the files they own.
    pub async fn clear(&self) -> Result<u64, CacheError> {
        for path in self.repo.list_backing_files(self.domain).await? {
            if let Err(err) = remove_backing_file(Path::new(&path)).await {
                warn!(
                    target = SOURCE,
                    domain = %self.domain,
                    path = path.as_str(),
                    error = %err,
                    "failed to remove backing file during clear"
                );
            }
        }
        Ok(self.repo.clear_domain(self.domain).await?)
    }

    fn miss(&self, key: &str, reason: MissReason) -> Option<CacheHit<T>> {
        counter!(
            METRIC_CACHE_MISS,
            "domain" => self.domain.as_str(),
            "reason" => reason.as_str()
        )
        .increment(1);
        debug!(
            target = SOURCE,
            domain = %self.domain,
            fingerprint = key,
            reason = reason.as_str(),
            "cache miss"
        );
        None
    }
}
