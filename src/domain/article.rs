//! Structured generator output and its validation rules.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::error::DomainError;

/// Maximum number of characters kept from a produced body for history comparisons.
pub const SNIPPET_CHARS: usize = 500;

/// Default floor for the generator's self-reported quality score.
pub const DEFAULT_MIN_QUALITY_SCORE: f64 = 60.0;

/// A validated article produced by the text generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedArticle {
    pub title: String,
    pub short_description: String,
    pub body: String,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub quality_score: f64,
    #[serde(default)]
    pub originality_score_hint: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawArticle {
    title: Option<String>,
    short_description: Option<String>,
    body: Option<String>,
    keywords: Option<Vec<String>>,
    category: Option<String>,
    quality_score: Option<f64>,
    originality_score_hint: Option<f64>,
}

impl GeneratedArticle {
    /// Validate a decoded object against the required-field and quality-floor rules.
    pub fn from_structured(value: Value, min_quality: f64) -> Result<Self, DomainError> {
        if !value.is_object() {
            return Err(DomainError::validation("structured result is not an object"));
        }
        let raw: RawArticle = serde_json::from_value(value)
            .map_err(|err| DomainError::validation(format!("unexpected field types: {err}")))?;

        let title = required_text(raw.title, "title")?;
        let short_description = required_text(raw.short_description, "shortDescription")?;
        let body = required_text(raw.body, "body")?;
        let keywords = raw
            .keywords
            .ok_or(DomainError::missing("keywords"))?
            .into_iter()
            .map(|keyword| keyword.trim().to_string())
            .filter(|keyword| !keyword.is_empty())
            .collect();

        let quality_score = raw.quality_score.unwrap_or(0.0);
        if quality_score < min_quality {
            return Err(DomainError::QualityBelowFloor {
                score: quality_score,
                floor: min_quality,
            });
        }

        Ok(Self {
            title,
            short_description,
            body,
            keywords,
            category: raw.category.filter(|value| !value.trim().is_empty()),
            quality_score,
            originality_score_hint: raw.originality_score_hint,
        })
    }
}

fn required_text(value: Option<String>, field: &'static str) -> Result<String, DomainError> {
    match value {
        Some(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
        _ => Err(DomainError::missing(field)),
    }
}

/// Bounded prefix of `text`, cut on a character boundary.
pub fn snippet(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => text[..index].to_string(),
        None => text.to_string(),
    }
}
