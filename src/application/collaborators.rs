//! Interfaces to the external services a cycle depends on.
//!
//! Implementations live outside this crate (feed readers, generator clients, publish
//! targets). Each call either succeeds or fails with a [`CollaboratorError`] whose kind
//! tells the retry wrapper whether another attempt may help.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::article::GeneratedArticle;
use crate::domain::entities::Candidate;
use crate::domain::types::RoutingMode;

#[derive(Debug, Clone, Error)]
pub enum CollaboratorError {
    /// Timeouts, throttling and other failures worth another attempt.
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl CollaboratorError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent(message.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

#[async_trait]
pub trait Discovery: Send + Sync {
    /// Candidates in the order they should be processed.
    async fn fetch_candidates(&self, limit: usize) -> Result<Vec<Candidate>, CollaboratorError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub locator: String,
    pub title: String,
    pub summary: String,
}

/// Raw generator output, decoded by the cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct RawGeneration {
    pub text: String,
    pub tokens_used: u64,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Provider identity; part of the text cache key so switching providers misses.
    fn provider(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest)
    -> Result<RawGeneration, CollaboratorError>;
}

#[async_trait]
pub trait AssetGenerator: Send + Sync {
    /// Path of the produced file, or `None` when the service produced nothing usable.
    async fn generate_asset(&self, prompt: &str) -> Result<Option<PathBuf>, CollaboratorError>;
}

#[async_trait]
pub trait RelatedSearch: Send + Sync {
    async fn find_related(
        &self,
        title: &str,
        keywords: &[String],
    ) -> Result<Option<String>, CollaboratorError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteRequest {
    pub candidate: Candidate,
    pub article: GeneratedArticle,
    pub enriched_body: String,
    pub asset_path: PathBuf,
    pub related_url: Option<String>,
    pub mode: RoutingMode,
}

#[async_trait]
pub trait Router: Send + Sync {
    /// Hand the finished item to its destination and return where it landed.
    async fn route(&self, request: &RouteRequest) -> Result<String, CollaboratorError>;
}
