//! Maintenance of persisted state: expired cache entries, aged history, old usage rows.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::Serialize;
use time::UtcOffset;
use tracing::{info, warn};

use crate::application::clock::{Clock, saturating_before};
use crate::application::repos::{CacheRepo, HistoryRepo, RateLimitRepo, RepoError};
use crate::domain::types::CacheDomain;
use crate::infra::files::remove_backing_file;

const SOURCE: &str = "application::retention";
const METRIC_SWEEP_DELETED: &str = "rotativa_sweep_deleted_total";
const METRIC_SWEEP_RECLAIMED: &str = "rotativa_sweep_reclaimed_bytes_total";
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionConfig {
    pub history_days: u32,
    pub usage_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            history_days: 90,
            usage_days: 30,
        }
    }
}

impl From<&crate::config::RetentionSettings> for RetentionConfig {
    fn from(settings: &crate::config::RetentionSettings) -> Self {
        Self {
            history_days: settings.history_days.get(),
            usage_days: settings.usage_days.get(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainSweep {
    pub domain: &'static str,
    pub deleted: u64,
    pub reclaimed_bytes: u64,
    /// Backing files that were already gone when their entry was removed.
    pub missing_files: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub domains: Vec<DomainSweep>,
}

impl SweepReport {
    pub fn deleted_for(&self, domain: CacheDomain) -> u64 {
        self.domains
            .iter()
            .find(|sweep| sweep.domain == domain.as_str())
            .map_or(0, |sweep| sweep.deleted)
    }

    pub fn total_deleted(&self) -> u64 {
        self.domains.iter().map(|sweep| sweep.deleted).sum()
    }

    pub fn reclaimed_bytes(&self) -> u64 {
        self.domains.iter().map(|sweep| sweep.reclaimed_bytes).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub sweep: SweepReport,
    pub history_pruned: u64,
    pub usage_pruned: u64,
}

pub struct RetentionSweeper {
    cache: Arc<dyn CacheRepo>,
    history: Arc<dyn HistoryRepo>,
    usage: Arc<dyn RateLimitRepo>,
    clock: Arc<dyn Clock>,
    config: RetentionConfig,
}

impl RetentionSweeper {
    pub fn new(
        cache: Arc<dyn CacheRepo>,
        history: Arc<dyn HistoryRepo>,
        usage: Arc<dyn RateLimitRepo>,
        clock: Arc<dyn Clock>,
        config: RetentionConfig,
    ) -> Self {
        Self {
            cache,
            history,
            usage,
            clock,
            config,
        }
    }

    pub fn config(&self) -> RetentionConfig {
        self.config
    }

    /// Delete every expired entry in every domain. Asset files go first; a file that is
    /// already missing does not block removal of its entry.
    pub async fn sweep_expired(&self) -> Result<SweepReport, RepoError> {
        let now = self.clock.now();
        let mut report = SweepReport::default();

        for domain in CacheDomain::ALL {
            let mut sweep = DomainSweep {
                domain: domain.as_str(),
                deleted: 0,
                reclaimed_bytes: 0,
                missing_files: 0,
            };

            for entry in self.cache.list_expired(domain, now).await? {
                if let Some(path) = entry.backing_file.as_deref() {
                    match remove_backing_file(path).await {
                        Ok(Some(bytes)) => sweep.reclaimed_bytes += bytes,
                        Ok(None) => sweep.missing_files += 1,
                        Err(err) => {
                            warn!(
                                target = SOURCE,
                                domain = %domain,
                                fingerprint = entry.fingerprint.as_str(),
                                path = %path.display(),
                                error = %err,
                                "could not remove backing file; keeping entry"
                            );
                            continue;
                        }
                    }
                }

                if self.cache.delete_entry(domain, &entry.fingerprint).await? {
                    sweep.deleted += 1;
                    sweep.reclaimed_bytes += entry.payload.len() as u64;
                }
            }

            counter!(METRIC_SWEEP_DELETED, "domain" => domain.as_str()).increment(sweep.deleted);
            counter!(METRIC_SWEEP_RECLAIMED, "domain" => domain.as_str())
                .increment(sweep.reclaimed_bytes);
            report.domains.push(sweep);
        }

        info!(
            target = SOURCE,
            deleted = report.total_deleted(),
            reclaimed_bytes = report.reclaimed_bytes(),
            "expired cache entries swept"
        );
        Ok(report)
    }

    /// Delete history records produced more than `older_than_days` ago. Independent of the
    /// originality window.
    pub async fn prune_history(&self, older_than_days: u32) -> Result<u64, RepoError> {
        let before = saturating_before(self.clock.now(), DAY * older_than_days);
        let removed = self.history.prune_produced(before).await?;
        info!(target = SOURCE, older_than_days, removed, "history pruned");
        Ok(removed)
    }

    /// Delete usage rows for days older than `older_than_days`.
    pub async fn prune_usage(&self, older_than_days: u32) -> Result<u64, RepoError> {
        let before = saturating_before(self.clock.now(), DAY * older_than_days)
            .to_offset(UtcOffset::UTC)
            .date();
        let removed = self.usage.prune_usage(before).await?;
        info!(target = SOURCE, older_than_days, removed, "usage rows pruned");
        Ok(removed)
    }

    /// Sweep plus history and usage pruning with the configured ages.
    pub async fn run_maintenance(&self) -> Result<MaintenanceReport, RepoError> {
        let sweep = self.sweep_expired().await?;
        let history_pruned = self.prune_history(self.config.history_days).await?;
        let usage_pruned = self.prune_usage(self.config.usage_days).await?;
        Ok(MaintenanceReport {
            sweep,
            history_pruned,
            usage_pruned,
        })
    }
}

#[cfg(test)]
mod tests {
    use time::macros::{date, datetime};
    use uuid::Uuid;

    use super::*;
    use crate::application::clock::ManualClock;
    use crate::cache::{AssetRef, KeyedCache};
    use crate::domain::entities::ProducedItemRecord;
    use crate::domain::types::RoutingMode;
    use crate::infra::memory::MemoryRepositories;

    fn sweeper(repos: Arc<MemoryRepositories>, clock: Arc<ManualClock>) -> RetentionSweeper {
        RetentionSweeper::new(
            repos.clone(),
            repos.clone(),
            repos,
            clock,
            RetentionConfig::default(),
        )
    }

    #[tokio::test]
    async fn sweep_removes_expired_assets_and_their_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let kept = dir.path().join("kept.png");
        let expired = dir.path().join("expired.png");
        tokio::fs::write(&kept, vec![1u8; 10]).await.expect("write");
        tokio::fs::write(&expired, vec![1u8; 40]).await.expect("write");

        let clock = Arc::new(ManualClock::new(datetime!(2026-05-01 00:00 UTC)));
        let repos = Arc::new(MemoryRepositories::new());
        let assets: KeyedCache<AssetRef> =
            KeyedCache::new(CacheDomain::Asset, DAY * 90, repos.clone(), clock.clone());

        assets
            .put(&["short"], &AssetRef { path: expired.clone() }, Some(DAY))
            .await
            .expect("put");
        assets
            .put(&["long"], &AssetRef { path: kept.clone() }, None)
            .await
            .expect("put");
        clock.advance(DAY * 2);

        let report = sweeper(repos, clock).sweep_expired().await.expect("sweep");

        assert_eq!(report.deleted_for(CacheDomain::Asset), 1);
        assert_eq!(report.total_deleted(), 1);
        assert!(report.reclaimed_bytes() >= 40);
        assert!(!expired.exists());
        assert!(kept.exists());
        assert_eq!(assets.stats().await.expect("stats").count, 1);
    }

    #[tokio::test]
    async fn sweep_tolerates_missing_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let clock = Arc::new(ManualClock::new(datetime!(2026-05-01 00:00 UTC)));
        let repos = Arc::new(MemoryRepositories::new());
        let assets: KeyedCache<AssetRef> =
            KeyedCache::new(CacheDomain::Asset, DAY, repos.clone(), clock.clone());
        let texts: KeyedCache<String> =
            KeyedCache::new(CacheDomain::Text, DAY, repos.clone(), clock.clone());

        assets
            .put(&["gone"], &AssetRef { path: dir.path().join("never-written.png") }, None)
            .await
            .expect("put");
        texts.put(&["t"], &"body".to_string(), None).await.expect("put");
        clock.advance(DAY * 3);

        let report = sweeper(repos, clock).sweep_expired().await.expect("sweep");
        assert_eq!(report.deleted_for(CacheDomain::Asset), 1);
        assert_eq!(report.deleted_for(CacheDomain::Text), 1);
        assert_eq!(report.deleted_for(CacheDomain::Search), 0);
        let asset_sweep = report
            .domains
            .iter()
            .find(|sweep| sweep.domain == "asset")
            .expect("asset sweep");
        assert_eq!(asset_sweep.missing_files, 1);
    }

    #[tokio::test]
    async fn pruning_beyond_the_calendar_removes_nothing() {
        let clock = Arc::new(ManualClock::new(datetime!(2026-05-01 00:00 UTC)));
        let repos = Arc::new(MemoryRepositories::new());
        repos
            .insert_produced(ProducedItemRecord {
                id: Uuid::new_v4(),
                source_hash: "kept".to_string(),
                content_hash: "kept".to_string(),
                content_snippet: String::new(),
                locator: "kept".to_string(),
                title: "kept".to_string(),
                source_name: "feed".to_string(),
                routed_locator: "r".to_string(),
                routing_mode: RoutingMode::Review,
                quality_score: 70.0,
                originality_score: 0.7,
                produced_at: datetime!(2020-01-01 00:00 UTC),
            })
            .await
            .expect("insert");
        repos
            .record_usage("generation", date!(2020 - 01 - 01), 1, 1)
            .await
            .expect("usage");

        let sweeper = sweeper(repos.clone(), clock);
        assert_eq!(sweeper.prune_history(5_000_000).await.expect("prune"), 0);
        assert_eq!(sweeper.prune_usage(u32::MAX).await.expect("prune"), 0);
        assert!(repos.source_exists("kept").await.expect("lookup"));
    }

    #[tokio::test]
    async fn maintenance_prunes_history_and_usage_by_age() {
        let clock = Arc::new(ManualClock::new(datetime!(2026-05-01 00:00 UTC)));
        let repos = Arc::new(MemoryRepositories::new());

        for (locator, produced_at) in [
            ("old", datetime!(2026-01-01 00:00 UTC)),
            ("recent", datetime!(2026-04-20 00:00 UTC)),
        ] {
            repos
                .insert_produced(ProducedItemRecord {
                    id: Uuid::new_v4(),
                    source_hash: locator.to_string(),
                    content_hash: locator.to_string(),
                    content_snippet: String::new(),
                    locator: locator.to_string(),
                    title: locator.to_string(),
                    source_name: "feed".to_string(),
                    routed_locator: "r".to_string(),
                    routing_mode: RoutingMode::Review,
                    quality_score: 70.0,
                    originality_score: 0.7,
                    produced_at,
                })
                .await
                .expect("insert");
        }
        repos
            .record_usage("generation", date!(2026 - 03 - 01), 3, 100)
            .await
            .expect("usage");
        repos
            .record_usage("generation", date!(2026 - 04 - 30), 1, 10)
            .await
            .expect("usage");

        let report = sweeper(repos.clone(), clock)
            .run_maintenance()
            .await
            .expect("maintenance");

        assert_eq!(report.history_pruned, 1);
        assert_eq!(report.usage_pruned, 1);
        assert!(repos.source_exists("recent").await.expect("lookup"));
        assert!(!repos.source_exists("old").await.expect("lookup"));
    }
}
