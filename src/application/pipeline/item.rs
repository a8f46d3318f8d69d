//! Per-item steps of a cycle: generate, score, enrich, route, record.

use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::collaborators::{CollaboratorError, GenerationRequest, RouteRequest};
use crate::application::decode::{DecodeError, decode_structured};
use crate::application::dedup::DuplicateGuard;
use crate::application::originality::{LowOriginality, OriginalityVerdict};
use crate::application::rate_limit::{SERVICE_ASSET, SERVICE_GENERATION, SERVICE_SEARCH};
use crate::application::repos::RepoError;
use crate::application::retry::retry_with_backoff;
use crate::cache::{AssetRef, CacheError};
use crate::domain::article::{GeneratedArticle, SNIPPET_CHARS, snippet};
use crate::domain::entities::{Candidate, ProducedItemRecord};
use crate::domain::error::DomainError;
use crate::domain::types::{CyclePhase, RoutingMode};

use super::enrich::enrich_body;
use super::{CycleError, CycleOrchestrator, SOURCE};

#[derive(Debug, Error)]
pub(super) enum ItemError {
    #[error("generator output could not be decoded: {0}")]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Invalid(#[from] DomainError),
    #[error("generated body duplicates an earlier item")]
    DuplicateContent,
    #[error("originality {score:.2} below threshold ({})", .reason.as_str())]
    LowOriginality { reason: LowOriginality, score: f64 },
    #[error("{step} failed: {source}")]
    Collaborator {
        step: &'static str,
        #[source]
        source: CollaboratorError,
    },
    #[error(transparent)]
    Fatal(#[from] CycleError),
}

impl From<RepoError> for ItemError {
    fn from(err: RepoError) -> Self {
        Self::Fatal(CycleError::Repo(err))
    }
}

impl From<CacheError> for ItemError {
    fn from(err: CacheError) -> Self {
        Self::Fatal(CycleError::Cache(err))
    }
}

pub(super) enum Disposition {
    Rejected(String),
    Errored(String),
    Fatal(CycleError),
}

impl ItemError {
    pub(super) fn into_disposition(self) -> Disposition {
        match self {
            ItemError::Fatal(err) => Disposition::Fatal(err),
            ItemError::Collaborator { .. } => Disposition::Errored(self.to_string()),
            ItemError::Decode(_)
            | ItemError::Invalid(_)
            | ItemError::DuplicateContent
            | ItemError::LowOriginality { .. } => Disposition::Rejected(self.to_string()),
        }
    }
}

pub(super) struct ItemOutcome {
    pub mode: RoutingMode,
    pub routed_locator: String,
    pub flagged: bool,
}

impl CycleOrchestrator {
    pub(super) async fn process_item(
        &self,
        candidate: &Candidate,
        source_hash: &str,
        manual_approval: bool,
    ) -> Result<ItemOutcome, ItemError> {
        self.set_phase(CyclePhase::Generating);
        let article = self.generate_article(candidate).await?;

        self.set_phase(CyclePhase::Scoring);
        let content_hash = DuplicateGuard::content_hash(&article.body);
        if self.guard.is_duplicate_content(&content_hash).await? {
            return Err(ItemError::DuplicateContent);
        }
        let originality = self.scorer.evaluate(&candidate.summary, &article.body).await?;
        let flagged = match originality.verdict {
            OriginalityVerdict::Original => false,
            OriginalityVerdict::Flagged(reason) => {
                info!(
                    target = SOURCE,
                    locator = candidate.locator.as_str(),
                    reason = reason.as_str(),
                    score = originality.final_score,
                    "low originality; routing to review"
                );
                true
            }
            OriginalityVerdict::Rejected(reason) => {
                return Err(ItemError::LowOriginality {
                    reason,
                    score: originality.final_score,
                });
            }
        };

        self.set_phase(CyclePhase::Enriching);
        let asset_path = self.resolve_asset(&article).await?;
        let related_url = self.resolve_related(&article).await?;
        let enriched_body = enrich_body(&article.body, related_url.as_deref(), candidate);

        self.set_phase(CyclePhase::Routing);
        let mode = if manual_approval || flagged {
            RoutingMode::Review
        } else {
            RoutingMode::Publish
        };
        let request = RouteRequest {
            candidate: candidate.clone(),
            article,
            enriched_body,
            asset_path,
            related_url,
            mode,
        };
        let router = self.collaborators.router.as_ref();
        let request_ref = &request;
        let routed_locator = retry_with_backoff(
            &self.retry,
            self.clock.as_ref(),
            "route",
            || async move { router.route(request_ref).await },
        )
        .await
        .map_err(|source| ItemError::Collaborator {
            step: "route",
            source,
        })?;

        let RouteRequest { article, .. } = request;
        let record = ProducedItemRecord {
            id: Uuid::new_v4(),
            source_hash: source_hash.to_string(),
            content_hash,
            content_snippet: snippet(&article.body, SNIPPET_CHARS),
            locator: candidate.locator.clone(),
            title: article.title.clone(),
            source_name: candidate.source_name.clone(),
            routed_locator: routed_locator.clone(),
            routing_mode: mode,
            quality_score: article.quality_score,
            originality_score: originality.final_score,
            produced_at: self.clock.now(),
        };
        if !self.history.insert_produced(record).await? {
            warn!(
                target = SOURCE,
                locator = candidate.locator.as_str(),
                "source already recorded; history left unchanged"
            );
        }

        Ok(ItemOutcome {
            mode,
            routed_locator,
            flagged,
        })
    }

    /// Cached structured result for the candidate, or a fresh, validated generation.
    async fn generate_article(&self, candidate: &Candidate) -> Result<GeneratedArticle, ItemError> {
        let excerpt = snippet(&candidate.summary, self.config.source_excerpt_chars);
        let generator = self.collaborators.text.as_ref();
        let provider = generator.provider().to_string();
        let fields = [
            candidate.locator.as_str(),
            candidate.title.as_str(),
            excerpt.as_str(),
            provider.as_str(),
        ];

        if let Some(hit) = self.caches.text.get(&fields).await? {
            info!(
                target = SOURCE,
                locator = candidate.locator.as_str(),
                hit_count = hit.hit_count,
                "generated text served from cache"
            );
            return Ok(hit.payload);
        }

        let request = GenerationRequest {
            locator: candidate.locator.clone(),
            title: candidate.title.clone(),
            summary: excerpt.clone(),
        };
        let limiter = self.limiter.as_ref();
        let request_ref = &request;
        let raw = retry_with_backoff(
            &self.retry,
            self.clock.as_ref(),
            "generate_text",
            || async move {
                limiter.acquire_service(SERVICE_GENERATION).await;
                generator.generate(request_ref).await
            },
        )
        .await
        .map_err(|source| ItemError::Collaborator {
            step: "generate_text",
            source,
        })?;
        self.limiter
            .record_usage(SERVICE_GENERATION, 1, raw.tokens_used)
            .await;

        let decoded = match decode_structured(&raw.text) {
            Ok(decoded) => decoded,
            Err(err) => {
                self.keep_raw_response(candidate, &raw.text).await;
                return Err(err.into());
            }
        };
        debug!(
            target = SOURCE,
            locator = candidate.locator.as_str(),
            stage = decoded.stage.as_str(),
            "generator output decoded"
        );

        let article = GeneratedArticle::from_structured(decoded.value, self.config.min_quality_score)?;
        self.caches.text.put(&fields, &article, None).await?;
        Ok(article)
    }

    /// Cached asset, a fresh one, or the configured placeholder. Placeholders are never
    /// cached and asset failures never fail the item.
    async fn resolve_asset(&self, article: &GeneratedArticle) -> Result<PathBuf, ItemError> {
        let prompt = format!("{}: {}", self.config.asset_prompt_style, article.title);
        let fields = [prompt.as_str()];

        if let Some(hit) = self.caches.asset.get(&fields).await? {
            return Ok(hit.payload.path);
        }
        if !self.config.generate_assets {
            return Ok(self.config.placeholder_asset.clone());
        }

        let generator = self.collaborators.assets.as_ref();
        let limiter = self.limiter.as_ref();
        let prompt_ref = prompt.as_str();
        let generated = retry_with_backoff(
            &self.retry,
            self.clock.as_ref(),
            "generate_asset",
            || async move {
                limiter.acquire_service(SERVICE_ASSET).await;
                generator.generate_asset(prompt_ref).await
            },
        )
        .await;

        match generated {
            Ok(Some(path)) => {
                self.limiter.record_usage(SERVICE_ASSET, 1, 0).await;
                self.caches
                    .asset
                    .put(&fields, &AssetRef { path: path.clone() }, None)
                    .await?;
                Ok(path)
            }
            Ok(None) => {
                self.limiter.record_usage(SERVICE_ASSET, 1, 0).await;
                info!(target = SOURCE, "asset generator returned nothing; using placeholder");
                Ok(self.config.placeholder_asset.clone())
            }
            Err(err) => {
                warn!(
                    target = SOURCE,
                    error = %err,
                    "asset generation failed; using placeholder"
                );
                Ok(self.config.placeholder_asset.clone())
            }
        }
    }

    /// Related link for the article. Search failures leave the item without one.
    async fn resolve_related(&self, article: &GeneratedArticle) -> Result<Option<String>, ItemError> {
        let keywords: Vec<String> = article
            .keywords
            .iter()
            .take(self.config.search_keyword_limit)
            .cloned()
            .collect();
        let query = keywords.join(" ");
        let fields = [article.title.as_str(), query.as_str()];

        if let Some(hit) = self.caches.search.get(&fields).await? {
            return Ok(Some(hit.payload));
        }

        let search = self.collaborators.search.as_ref();
        let limiter = self.limiter.as_ref();
        let title = article.title.as_str();
        let keywords_ref = keywords.as_slice();
        let found = retry_with_backoff(
            &self.retry,
            self.clock.as_ref(),
            "find_related",
            || async move {
                limiter.acquire_service(SERVICE_SEARCH).await;
                search.find_related(title, keywords_ref).await
            },
        )
        .await;

        match found {
            Ok(Some(url)) => {
                self.limiter.record_usage(SERVICE_SEARCH, 1, 0).await;
                self.caches.search.put(&fields, &url, None).await?;
                Ok(Some(url))
            }
            Ok(None) => {
                self.limiter.record_usage(SERVICE_SEARCH, 1, 0).await;
                Ok(None)
            }
            Err(err) => {
                warn!(
                    target = SOURCE,
                    error = %err,
                    "related search failed; continuing without a link"
                );
                Ok(None)
            }
        }
    }

    async fn keep_raw_response(&self, candidate: &Candidate, raw: &str) {
        let Some(store) = &self.raw_responses else {
            return;
        };
        match store.store(&candidate.title, raw).await {
            Ok(path) => warn!(
                target = SOURCE,
                locator = candidate.locator.as_str(),
                path = %path.display(),
                "undecodable generator output saved"
            ),
            Err(err) => warn!(
                target = SOURCE,
                locator = candidate.locator.as_str(),
                error = %err,
                "failed to save undecodable generator output"
            ),
        }
    }
}
