//! Near-duplicate screening with word-level Jaccard similarity.
//!
//! A generated body is compared against its own source material and against snippets of
//! recently produced items. The lower of the two originality scores decides.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::application::clock::{Clock, saturating_before};
use crate::application::repos::{HistoryRepo, RepoError};
use crate::domain::article::{SNIPPET_CHARS, snippet};
use crate::domain::entities::ProducedItemRecord;

const SOURCE: &str = "application::originality";
const HISTORY_SIMILARITY_ALERT: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct OriginalityConfig {
    pub window: Duration,
    pub window_limit: usize,
    pub threshold: f64,
    pub reject_source_copy: bool,
    pub reject_history_repeat: bool,
}

impl Default for OriginalityConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(7 * 24 * 60 * 60),
            window_limit: 50,
            threshold: 0.3,
            reject_source_copy: true,
            reject_history_repeat: false,
        }
    }
}

impl From<&crate::config::OriginalitySettings> for OriginalityConfig {
    fn from(settings: &crate::config::OriginalitySettings) -> Self {
        Self {
            window: settings.window,
            window_limit: settings.window_limit.get() as usize,
            threshold: settings.threshold,
            reject_source_copy: settings.reject_source_copy,
            reject_history_repeat: settings.reject_history_repeat,
        }
    }
}

/// Which comparison pulled the final score below the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LowOriginality {
    SourceCopy,
    HistoryRepeat,
}

impl LowOriginality {
    pub fn as_str(self) -> &'static str {
        match self {
            LowOriginality::SourceCopy => "source_copy",
            LowOriginality::HistoryRepeat => "history_repeat",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OriginalityVerdict {
    Original,
    /// Kept, but must go through review.
    Flagged(LowOriginality),
    Rejected(LowOriginality),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OriginalityReport {
    pub source_score: f64,
    pub history_score: f64,
    pub final_score: f64,
    pub verdict: OriginalityVerdict,
}

/// Lowercased whitespace-separated tokens.
pub fn tokenize(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|token| token.to_lowercase())
        .collect()
}

/// Jaccard similarity of the token sets. Two empty texts are identical (1.0); an empty text
/// shares nothing with a non-empty one (0.0).
pub fn similarity(a: &str, b: &str) -> f64 {
    let left = tokenize(a);
    let right = tokenize(b);
    match (left.is_empty(), right.is_empty()) {
        (true, true) => return 1.0,
        (true, false) | (false, true) => return 0.0,
        (false, false) => {}
    }
    let shared = left.intersection(&right).count();
    let union = left.len() + right.len() - shared;
    shared as f64 / union as f64
}

/// Originality of `generated` relative to its source: `1 - similarity`.
pub fn source_score(source: &str, generated: &str) -> f64 {
    1.0 - similarity(source, generated)
}

/// Originality against the history window. The generated text is cut to the same bounded
/// prefix stored for history records so that identical bodies compare as identical.
pub fn history_score(generated: &str, window: &[ProducedItemRecord]) -> f64 {
    let prefix = snippet(generated, SNIPPET_CHARS);
    let max_similarity = window
        .iter()
        .map(|record| similarity(&prefix, &record.content_snippet))
        .fold(0.0_f64, f64::max);
    1.0 - max_similarity
}

pub struct OriginalityScorer {
    history: Arc<dyn HistoryRepo>,
    clock: Arc<dyn Clock>,
    config: OriginalityConfig,
}

impl OriginalityScorer {
    pub fn new(
        history: Arc<dyn HistoryRepo>,
        clock: Arc<dyn Clock>,
        config: OriginalityConfig,
    ) -> Self {
        Self {
            history,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &OriginalityConfig {
        &self.config
    }

    /// Newest-first records produced within the trailing window, capped.
    pub async fn load_window(&self) -> Result<Vec<ProducedItemRecord>, RepoError> {
        let since = saturating_before(self.clock.now(), self.config.window);
        self.history
            .recent_produced(since, self.config.window_limit)
            .await
    }

    pub async fn evaluate(
        &self,
        source: &str,
        generated: &str,
    ) -> Result<OriginalityReport, RepoError> {
        let window = self.load_window().await?;
        Ok(self.evaluate_against(source, generated, &window))
    }

    pub fn evaluate_against(
        &self,
        source: &str,
        generated: &str,
        window: &[ProducedItemRecord],
    ) -> OriginalityReport {
        let source_score = source_score(source, generated);
        let history_score = history_score(generated, window);
        let final_score = source_score.min(history_score);

        if 1.0 - history_score > HISTORY_SIMILARITY_ALERT {
            warn!(
                target = SOURCE,
                history_similarity = 1.0 - history_score,
                window = window.len(),
                "generated text closely resembles recent output"
            );
        }

        OriginalityReport {
            source_score,
            history_score,
            final_score,
            verdict: self.verdict(source_score, history_score),
        }
    }

    fn verdict(&self, source_score: f64, history_score: f64) -> OriginalityVerdict {
        let threshold = self.config.threshold;
        if source_score < threshold {
            return if self.config.reject_source_copy {
                OriginalityVerdict::Rejected(LowOriginality::SourceCopy)
            } else {
                OriginalityVerdict::Flagged(LowOriginality::SourceCopy)
            };
        }
        if history_score < threshold {
            return if self.config.reject_history_repeat {
                OriginalityVerdict::Rejected(LowOriginality::HistoryRepeat)
            } else {
                OriginalityVerdict::Flagged(LowOriginality::HistoryRepeat)
            };
        }
        OriginalityVerdict::Original
    }
}
