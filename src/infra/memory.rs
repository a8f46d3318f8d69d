//! In-process repository implementations.
//!
//! Used by tests and by embedders that do not need state to survive a restart. Every
//! read-modify-write happens under one write lock, which gives the same per-key atomicity
//! as the conditional statements of the SQLite store.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use time::{Date, OffsetDateTime};

use crate::application::repos::{
    CacheRepo, HistoryRepo, RateLimitRepo, RepoError, SettingsRepo,
};
use crate::domain::entities::{
    CacheDomainCounts, CacheEntry, NewCacheEntry, ProducedItemRecord, UsageRecord,
};
use crate::domain::types::CacheDomain;

use super::lock::{rw_read, rw_write};

const SOURCE: &str = "infra::memory";

type CacheTable = HashMap<String, CacheEntry>;

#[derive(Debug, Default)]
pub struct MemoryRepositories {
    text: RwLock<CacheTable>,
    search: RwLock<CacheTable>,
    asset: RwLock<CacheTable>,
    rate_limits: RwLock<HashMap<String, OffsetDateTime>>,
    usage: RwLock<HashMap<(String, Date), UsageRecord>>,
    produced: RwLock<Vec<ProducedItemRecord>>,
    settings: RwLock<HashMap<String, String>>,
}

impl MemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, domain: CacheDomain) -> &RwLock<CacheTable> {
        match domain {
            CacheDomain::Text => &self.text,
            CacheDomain::Search => &self.search,
            CacheDomain::Asset => &self.asset,
        }
    }
}

#[async_trait]
impl CacheRepo for MemoryRepositories {
    async fn find_entry(
        &self,
        domain: CacheDomain,
        fingerprint: &str,
    ) -> Result<Option<CacheEntry>, RepoError> {
        Ok(rw_read(self.table(domain), SOURCE, "find_entry")
            .get(fingerprint)
            .cloned())
    }

    async fn upsert_entry(&self, entry: NewCacheEntry) -> Result<(), RepoError> {
        let row = CacheEntry {
            domain: entry.domain,
            fingerprint: entry.fingerprint.clone(),
            input_summary: entry.input_summary,
            payload: entry.payload,
            backing_file: entry.backing_file,
            hit_count: 0,
            last_hit_at: None,
            created_at: entry.created_at,
            expires_at: entry.expires_at,
            valid: true,
        };
        rw_write(self.table(entry.domain), SOURCE, "upsert_entry").insert(entry.fingerprint, row);
        Ok(())
    }

    async fn record_hit(
        &self,
        domain: CacheDomain,
        fingerprint: &str,
        at: OffsetDateTime,
    ) -> Result<Option<CacheEntry>, RepoError> {
        let mut table = rw_write(self.table(domain), SOURCE, "record_hit");
        match table.get_mut(fingerprint) {
            Some(entry) if entry.is_live_at(at) => {
                entry.hit_count += 1;
                entry.last_hit_at = Some(at);
                Ok(Some(entry.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn invalidate_entry(
        &self,
        domain: CacheDomain,
        fingerprint: &str,
    ) -> Result<bool, RepoError> {
        let mut table = rw_write(self.table(domain), SOURCE, "invalidate_entry");
        Ok(match table.get_mut(fingerprint) {
            Some(entry) => {
                entry.valid = false;
                true
            }
            None => false,
        })
    }

    async fn delete_entry(
        &self,
        domain: CacheDomain,
        fingerprint: &str,
    ) -> Result<bool, RepoError> {
        Ok(rw_write(self.table(domain), SOURCE, "delete_entry")
            .remove(fingerprint)
            .is_some())
    }

    async fn list_expired(
        &self,
        domain: CacheDomain,
        now: OffsetDateTime,
    ) -> Result<Vec<CacheEntry>, RepoError> {
        let table = rw_read(self.table(domain), SOURCE, "list_expired");
        let mut expired: Vec<CacheEntry> = table
            .values()
            .filter(|entry| entry.expires_at <= now)
            .cloned()
            .collect();
        expired.sort_by(|a, b| a.expires_at.cmp(&b.expires_at));
        Ok(expired)
    }

    async fn list_backing_files(&self, domain: CacheDomain) -> Result<Vec<String>, RepoError> {
        let table = rw_read(self.table(domain), SOURCE, "list_backing_files");
        Ok(table
            .values()
            .filter_map(|entry| entry.backing_file.as_ref())
            .map(|path| path.to_string_lossy().into_owned())
            .collect())
    }

    async fn domain_counts(&self, domain: CacheDomain) -> Result<CacheDomainCounts, RepoError> {
        let table = rw_read(self.table(domain), SOURCE, "domain_counts");
        Ok(CacheDomainCounts {
            entries: table.len() as u64,
            entries_with_hits: table.values().filter(|entry| entry.hit_count > 0).count() as u64,
            payload_bytes: table.values().map(|entry| entry.payload.len() as u64).sum(),
        })
    }

    async fn clear_domain(&self, domain: CacheDomain) -> Result<u64, RepoError> {
        let mut table = rw_write(self.table(domain), SOURCE, "clear_domain");
        let removed = table.len() as u64;
        table.clear();
        Ok(removed)
    }
}

#[async_trait]
impl RateLimitRepo for MemoryRepositories {
    async fn last_request_at(&self, service: &str) -> Result<Option<OffsetDateTime>, RepoError> {
        Ok(rw_read(&self.rate_limits, SOURCE, "last_request_at")
            .get(service)
            .copied())
    }

    async fn mark_request(&self, service: &str, at: OffsetDateTime) -> Result<(), RepoError> {
        rw_write(&self.rate_limits, SOURCE, "mark_request").insert(service.to_string(), at);
        Ok(())
    }

    async fn record_usage(
        &self,
        service: &str,
        day: Date,
        calls: u64,
        tokens: u64,
    ) -> Result<(), RepoError> {
        let mut usage = rw_write(&self.usage, SOURCE, "record_usage");
        let row = usage
            .entry((service.to_string(), day))
            .or_insert_with(|| UsageRecord {
                service: service.to_string(),
                day,
                calls: 0,
                tokens: 0,
            });
        row.calls += calls;
        row.tokens += tokens;
        Ok(())
    }

    async fn usage_for_day(
        &self,
        service: &str,
        day: Date,
    ) -> Result<Option<UsageRecord>, RepoError> {
        Ok(rw_read(&self.usage, SOURCE, "usage_for_day")
            .get(&(service.to_string(), day))
            .cloned())
    }

    async fn prune_usage(&self, before: Date) -> Result<u64, RepoError> {
        let mut usage = rw_write(&self.usage, SOURCE, "prune_usage");
        let initial = usage.len();
        usage.retain(|(_, day), _| *day >= before);
        Ok((initial - usage.len()) as u64)
    }
}

#[async_trait]
impl HistoryRepo for MemoryRepositories {
    async fn source_exists(&self, source_hash: &str) -> Result<bool, RepoError> {
        Ok(rw_read(&self.produced, SOURCE, "source_exists")
            .iter()
            .any(|record| record.source_hash == source_hash))
    }

    async fn content_exists(&self, content_hash: &str) -> Result<bool, RepoError> {
        Ok(rw_read(&self.produced, SOURCE, "content_exists")
            .iter()
            .any(|record| record.content_hash == content_hash))
    }

    async fn insert_produced(&self, record: ProducedItemRecord) -> Result<bool, RepoError> {
        let mut produced = rw_write(&self.produced, SOURCE, "insert_produced");
        if produced
            .iter()
            .any(|existing| existing.source_hash == record.source_hash)
        {
            return Ok(false);
        }
        produced.push(record);
        Ok(true)
    }

    async fn recent_produced(
        &self,
        since: OffsetDateTime,
        limit: usize,
    ) -> Result<Vec<ProducedItemRecord>, RepoError> {
        let produced = rw_read(&self.produced, SOURCE, "recent_produced");
        let mut window: Vec<ProducedItemRecord> = produced
            .iter()
            .filter(|record| record.produced_at >= since)
            .cloned()
            .collect();
        window.sort_by(|a, b| b.produced_at.cmp(&a.produced_at));
        window.truncate(limit);
        Ok(window)
    }

    async fn prune_produced(&self, before: OffsetDateTime) -> Result<u64, RepoError> {
        let mut produced = rw_write(&self.produced, SOURCE, "prune_produced");
        let initial = produced.len();
        produced.retain(|record| record.produced_at >= before);
        Ok((initial - produced.len()) as u64)
    }
}

#[async_trait]
impl SettingsRepo for MemoryRepositories {
    async fn get_setting(&self, key: &str) -> Result<Option<String>, RepoError> {
        Ok(rw_read(&self.settings, SOURCE, "get_setting").get(key).cloned())
    }

    async fn put_setting(&self, key: &str, value: &str) -> Result<(), RepoError> {
        rw_write(&self.settings, SOURCE, "put_setting").insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use time::macros::{date, datetime};
    use uuid::Uuid;

    use super::*;
    use crate::domain::types::RoutingMode;

    fn record(source_hash: &str, produced_at: OffsetDateTime) -> ProducedItemRecord {
        ProducedItemRecord {
            id: Uuid::new_v4(),
            source_hash: source_hash.to_string(),
            content_hash: format!("content-{source_hash}"),
            content_snippet: "snippet".to_string(),
            locator: format!("https://example.com/{source_hash}"),
            title: "Title".to_string(),
            source_name: "Feed".to_string(),
            routed_locator: "review-1".to_string(),
            routing_mode: RoutingMode::Review,
            quality_score: 80.0,
            originality_score: 0.9,
            produced_at,
        }
    }

    #[tokio::test]
    async fn reinserting_a_source_hash_is_skipped() {
        let repos = MemoryRepositories::new();
        let at = datetime!(2026-02-01 10:00 UTC);
        assert!(repos.insert_produced(record("a", at)).await.expect("insert"));
        assert!(!repos.insert_produced(record("a", at)).await.expect("insert"));
        assert!(repos.source_exists("a").await.expect("exists"));
        assert!(repos.content_exists("content-a").await.expect("exists"));
        assert!(!repos.source_exists("b").await.expect("exists"));
    }

    #[tokio::test]
    async fn recent_window_is_newest_first_and_capped() {
        let repos = MemoryRepositories::new();
        let base = datetime!(2026-02-10 00:00 UTC);
        for day in 0..5i64 {
            repos
                .insert_produced(record(&format!("s{day}"), base - time::Duration::days(day)))
                .await
                .expect("insert");
        }

        let window = repos
            .recent_produced(base - time::Duration::days(3), 3)
            .await
            .expect("window");
        let hashes: Vec<_> = window.iter().map(|r| r.source_hash.as_str()).collect();
        assert_eq!(hashes, vec!["s0", "s1", "s2"]);
    }

    #[tokio::test]
    async fn usage_accumulates_per_day_and_prunes() {
        let repos = MemoryRepositories::new();
        repos
            .record_usage("generation", date!(2026 - 02 - 01), 1, 100)
            .await
            .expect("usage");
        repos
            .record_usage("generation", date!(2026 - 02 - 01), 1, 50)
            .await
            .expect("usage");
        repos
            .record_usage("generation", date!(2026 - 02 - 03), 1, 10)
            .await
            .expect("usage");

        let day = repos
            .usage_for_day("generation", date!(2026 - 02 - 01))
            .await
            .expect("usage")
            .expect("row");
        assert_eq!((day.calls, day.tokens), (2, 150));

        assert_eq!(
            repos.prune_usage(date!(2026 - 02 - 02)).await.expect("prune"),
            1
        );
    }
}
