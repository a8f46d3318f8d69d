//! Generation cycle orchestration.
//!
//! A cycle pulls candidates from discovery, skips items already produced, and runs at most
//! `max_items_per_cycle` of the rest through generation, scoring, enrichment and routing.
//! Every expensive step consults its cache domain first. A failing item is counted and the
//! loop moves on; only storage failures end the cycle early.

mod enrich;
mod item;

use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::clock::Clock;
use crate::application::collaborators::{
    AssetGenerator, CollaboratorError, Discovery, RelatedSearch, Router, TextGenerator,
};
use crate::application::dedup::DuplicateGuard;
use crate::application::originality::{OriginalityConfig, OriginalityScorer};
use crate::application::rate_limit::{RateLimiter, SERVICE_DISCOVERY};
use crate::application::repos::{CacheRepo, HistoryRepo, RepoError};
use crate::application::retry::{RetryPolicy, retry_with_backoff};
use crate::application::settings::{
    KEY_MAX_ITEMS_PER_CYCLE, KEY_REQUIRE_MANUAL_APPROVAL, SettingsCascade,
};
use crate::cache::{AssetRef, CacheConfig, CacheError, CacheStats, KeyedCache};
use crate::domain::article::{DEFAULT_MIN_QUALITY_SCORE, GeneratedArticle};
use crate::domain::entities::Candidate;
use crate::domain::types::{CacheDomain, CyclePhase};
use crate::infra::files::RawResponseStore;
use crate::infra::lock::{rw_read, rw_write};

pub use enrich::enrich_body;

const SOURCE: &str = "application::pipeline";
const METRIC_CYCLE_ITEMS: &str = "rotativa_cycle_items_total";
const METRIC_CYCLE_MS: &str = "rotativa_cycle_ms";

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub max_items_per_cycle: usize,
    pub fetch_limit: usize,
    pub min_quality_score: f64,
    /// Characters of the candidate summary sent to the generator and hashed into the key.
    pub source_excerpt_chars: usize,
    pub generate_assets: bool,
    pub placeholder_asset: PathBuf,
    pub asset_prompt_style: String,
    pub require_manual_approval: bool,
    pub search_keyword_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_items_per_cycle: 5,
            fetch_limit: 15,
            min_quality_score: DEFAULT_MIN_QUALITY_SCORE,
            source_excerpt_chars: 1000,
            generate_assets: true,
            placeholder_asset: PathBuf::from("assets/placeholder.png"),
            asset_prompt_style: "Editorial illustration".to_string(),
            require_manual_approval: true,
            search_keyword_limit: 3,
        }
    }
}

impl From<&crate::config::PipelineSettings> for PipelineConfig {
    fn from(settings: &crate::config::PipelineSettings) -> Self {
        Self {
            max_items_per_cycle: settings.max_items_per_cycle.get() as usize,
            fetch_limit: settings.fetch_limit.get() as usize,
            min_quality_score: settings.min_quality_score,
            source_excerpt_chars: settings.source_excerpt_chars.get() as usize,
            generate_assets: settings.generate_assets,
            placeholder_asset: settings.placeholder_asset.clone(),
            asset_prompt_style: settings.asset_prompt_style.clone(),
            require_manual_approval: settings.require_manual_approval,
            search_keyword_limit: settings.search_keyword_limit.get() as usize,
        }
    }
}

/// External services used by a cycle.
#[derive(Clone)]
pub struct Collaborators {
    pub discovery: Arc<dyn Discovery>,
    pub text: Arc<dyn TextGenerator>,
    pub assets: Arc<dyn AssetGenerator>,
    pub search: Arc<dyn RelatedSearch>,
    pub router: Arc<dyn Router>,
}

/// One cache per domain, all backed by the same store.
#[derive(Clone)]
pub struct PipelineCaches {
    pub text: KeyedCache<GeneratedArticle>,
    pub search: KeyedCache<String>,
    pub asset: KeyedCache<AssetRef>,
}

impl PipelineCaches {
    pub fn new(repo: Arc<dyn CacheRepo>, clock: Arc<dyn Clock>, config: &CacheConfig) -> Self {
        Self {
            text: KeyedCache::new(
                CacheDomain::Text,
                config.ttl_for(CacheDomain::Text),
                Arc::clone(&repo),
                Arc::clone(&clock),
            ),
            search: KeyedCache::new(
                CacheDomain::Search,
                config.ttl_for(CacheDomain::Search),
                Arc::clone(&repo),
                Arc::clone(&clock),
            ),
            asset: KeyedCache::new(
                CacheDomain::Asset,
                config.ttl_for(CacheDomain::Asset),
                repo,
                clock,
            ),
        }
    }

    pub async fn stats(&self) -> Result<Vec<CacheStats>, CacheError> {
        Ok(vec![
            self.text.stats().await?,
            self.search.stats().await?,
            self.asset.stats().await?,
        ])
    }

    pub async fn clear(&self, domain: CacheDomain) -> Result<u64, CacheError> {
        match domain {
            CacheDomain::Text => self.text.clear().await,
            CacheDomain::Search => self.search.clear().await,
            CacheDomain::Asset => self.asset.clear().await,
        }
    }

    pub async fn invalidate(&self, domain: CacheDomain, fingerprint: &str) -> Result<bool, CacheError> {
        match domain {
            CacheDomain::Text => self.text.invalidate(fingerprint).await,
            CacheDomain::Search => self.search.invalidate(fingerprint).await,
            CacheDomain::Asset => self.asset.invalidate(fingerprint).await,
        }
    }
}

/// Everything the orchestrator needs, wired by the caller.
pub struct PipelineDeps {
    pub collaborators: Collaborators,
    pub caches: PipelineCaches,
    pub limiter: Arc<RateLimiter>,
    pub history: Arc<dyn HistoryRepo>,
    pub settings: Arc<SettingsCascade>,
    pub clock: Arc<dyn Clock>,
    pub retry: RetryPolicy,
    pub originality: OriginalityConfig,
    pub raw_responses: Option<RawResponseStore>,
}

/// Hard cap on the number of candidates that enter the pipeline in one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleBudget {
    pub max_items: usize,
    pub processed: usize,
}

impl CycleBudget {
    pub fn new(max_items: usize) -> Self {
        Self {
            max_items,
            processed: 0,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.processed >= self.max_items
    }

    pub fn consume(&mut self) {
        self.processed += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub fetched: usize,
    pub duplicates: usize,
    pub processed: usize,
    pub rejected: usize,
    pub errors: usize,
    /// Candidates left untouched because the budget ran out.
    pub deferred: usize,
    /// Processed items routed to review for low originality.
    pub flagged: usize,
    pub elapsed: Duration,
}

impl CycleReport {
    fn new(cycle_id: Uuid) -> Self {
        Self {
            cycle_id,
            fetched: 0,
            duplicates: 0,
            processed: 0,
            rejected: 0,
            errors: 0,
            deferred: 0,
            flagged: 0,
            elapsed: Duration::ZERO,
        }
    }
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("candidate discovery failed: {0}")]
    Discovery(#[source] CollaboratorError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

pub struct CycleOrchestrator {
    collaborators: Collaborators,
    caches: PipelineCaches,
    limiter: Arc<RateLimiter>,
    guard: DuplicateGuard,
    scorer: OriginalityScorer,
    history: Arc<dyn HistoryRepo>,
    settings: Arc<SettingsCascade>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    raw_responses: Option<RawResponseStore>,
    config: PipelineConfig,
    phase: RwLock<CyclePhase>,
}

impl CycleOrchestrator {
    pub fn new(deps: PipelineDeps, config: PipelineConfig) -> Self {
        let guard = DuplicateGuard::new(Arc::clone(&deps.history));
        let scorer = OriginalityScorer::new(
            Arc::clone(&deps.history),
            Arc::clone(&deps.clock),
            deps.originality,
        );
        Self {
            collaborators: deps.collaborators,
            caches: deps.caches,
            limiter: deps.limiter,
            guard,
            scorer,
            history: deps.history,
            settings: deps.settings,
            clock: deps.clock,
            retry: deps.retry,
            raw_responses: deps.raw_responses,
            config,
            phase: RwLock::new(CyclePhase::Idle),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn caches(&self) -> &PipelineCaches {
        &self.caches
    }

    pub fn phase(&self) -> CyclePhase {
        *rw_read(&self.phase, SOURCE, "phase")
    }

    /// Run one cycle to completion.
    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        let started = Instant::now();
        let mut report = CycleReport::new(Uuid::new_v4());
        let outcome = self.run_cycle_inner(&mut report).await;
        self.set_phase(CyclePhase::Idle);

        report.elapsed = started.elapsed();
        histogram!(METRIC_CYCLE_MS).record(report.elapsed.as_secs_f64() * 1000.0);

        match outcome {
            Ok(()) => {
                info!(
                    target = SOURCE,
                    cycle_id = %report.cycle_id,
                    fetched = report.fetched,
                    duplicates = report.duplicates,
                    processed = report.processed,
                    rejected = report.rejected,
                    errors = report.errors,
                    deferred = report.deferred,
                    flagged = report.flagged,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "cycle finished"
                );
                Ok(report)
            }
            Err(err) => {
                error!(
                    target = SOURCE,
                    cycle_id = %report.cycle_id,
                    processed = report.processed,
                    error = %err,
                    "cycle aborted"
                );
                Err(err)
            }
        }
    }

    async fn run_cycle_inner(&self, report: &mut CycleReport) -> Result<(), CycleError> {
        let mut budget = CycleBudget::new(self.resolve_budget().await);
        let manual_approval = self.resolve_manual_approval().await;
        info!(
            target = SOURCE,
            cycle_id = %report.cycle_id,
            max_items = budget.max_items,
            manual_approval,
            "cycle started"
        );

        self.set_phase(CyclePhase::Fetching);
        let candidates = self.fetch_candidates().await?;
        report.fetched = candidates.len();

        for (index, candidate) in candidates.iter().enumerate() {
            self.set_phase(CyclePhase::Filtering);
            if budget.is_exhausted() {
                report.deferred = candidates.len() - index;
                info!(
                    target = SOURCE,
                    cycle_id = %report.cycle_id,
                    deferred = report.deferred,
                    "cycle budget exhausted"
                );
                break;
            }

            let source_hash = DuplicateGuard::source_hash(&candidate.locator);
            if self.guard.is_duplicate(&source_hash).await? {
                report.duplicates += 1;
                record_item_outcome("duplicate");
                continue;
            }

            budget.consume();
            match self
                .process_item(candidate, &source_hash, manual_approval)
                .await
            {
                Ok(outcome) => {
                    report.processed += 1;
                    if outcome.flagged {
                        report.flagged += 1;
                    }
                    record_item_outcome("processed");
                    info!(
                        target = SOURCE,
                        cycle_id = %report.cycle_id,
                        locator = candidate.locator.as_str(),
                        mode = outcome.mode.as_str(),
                        routed = outcome.routed_locator.as_str(),
                        "item produced"
                    );
                }
                Err(err) => match err.into_disposition() {
                    item::Disposition::Fatal(err) => return Err(err),
                    item::Disposition::Rejected(reason) => {
                        report.rejected += 1;
                        record_item_outcome("rejected");
                        warn!(
                            target = SOURCE,
                            cycle_id = %report.cycle_id,
                            locator = candidate.locator.as_str(),
                            reason = reason.as_str(),
                            "item rejected"
                        );
                    }
                    item::Disposition::Errored(reason) => {
                        report.errors += 1;
                        record_item_outcome("error");
                        error!(
                            target = SOURCE,
                            cycle_id = %report.cycle_id,
                            locator = candidate.locator.as_str(),
                            error = reason.as_str(),
                            "item failed"
                        );
                    }
                },
            }
        }
        Ok(())
    }

    async fn fetch_candidates(&self) -> Result<Vec<Candidate>, CycleError> {
        let discovery = self.collaborators.discovery.as_ref();
        let limiter = self.limiter.as_ref();
        let limit = self.config.fetch_limit;

        let candidates = retry_with_backoff(
            &self.retry,
            self.clock.as_ref(),
            "fetch_candidates",
            || async move {
                limiter.acquire_service(SERVICE_DISCOVERY).await;
                discovery.fetch_candidates(limit).await
            },
        )
        .await
        .map_err(CycleError::Discovery)?;

        self.limiter.record_usage(SERVICE_DISCOVERY, 1, 0).await;
        Ok(candidates)
    }

    async fn resolve_budget(&self) -> usize {
        self.settings
            .resolve_parsed::<usize>(KEY_MAX_ITEMS_PER_CYCLE)
            .await
            .unwrap_or(self.config.max_items_per_cycle)
    }

    async fn resolve_manual_approval(&self) -> bool {
        self.settings
            .resolve_bool(KEY_REQUIRE_MANUAL_APPROVAL)
            .await
            .unwrap_or(self.config.require_manual_approval)
    }

    fn set_phase(&self, phase: CyclePhase) {
        *rw_write(&self.phase, SOURCE, "set_phase") = phase;
    }
}

fn record_item_outcome(outcome: &'static str) {
    counter!(METRIC_CYCLE_ITEMS, "outcome" => outcome).increment(1);
}
