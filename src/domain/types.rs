//! Shared domain enumerations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Fixed set of cache domains. Each domain has its own table and TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheDomain {
    /// Structured results from the text generator.
    Text,
    /// Related-content search results.
    Search,
    /// Generated assets; entries own a file on disk.
    Asset,
}

impl CacheDomain {
    pub const ALL: [CacheDomain; 3] = [CacheDomain::Text, CacheDomain::Search, CacheDomain::Asset];

    pub fn as_str(self) -> &'static str {
        match self {
            CacheDomain::Text => "text",
            CacheDomain::Search => "search",
            CacheDomain::Asset => "asset",
        }
    }

    /// Backing table name in the SQLite store.
    pub fn table(self) -> &'static str {
        match self {
            CacheDomain::Text => "text_cache",
            CacheDomain::Search => "search_cache",
            CacheDomain::Asset => "asset_cache",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" => Some(CacheDomain::Text),
            "search" => Some(CacheDomain::Search),
            "asset" => Some(CacheDomain::Asset),
            _ => None,
        }
    }

    /// Whether entries in this domain must have their backing file on disk to count as hits.
    pub fn requires_backing_file(self) -> bool {
        matches!(self, CacheDomain::Asset)
    }
}

impl fmt::Display for CacheDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase of a generation cycle, reported in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Fetching,
    Filtering,
    Generating,
    Scoring,
    Enriching,
    Routing,
}

impl CyclePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            CyclePhase::Idle => "idle",
            CyclePhase::Fetching => "fetching",
            CyclePhase::Filtering => "filtering",
            CyclePhase::Generating => "generating",
            CyclePhase::Scoring => "scoring",
            CyclePhase::Enriching => "enriching",
            CyclePhase::Routing => "routing",
        }
    }
}

/// Where a finished item is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMode {
    Publish,
    Review,
}

impl RoutingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RoutingMode::Publish => "publish",
            RoutingMode::Review => "review",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_domain_parse_accepts_display_form() {
        for domain in CacheDomain::ALL {
            assert_eq!(CacheDomain::parse(domain.as_str()), Some(domain));
        }
        assert_eq!(CacheDomain::parse(" Asset "), Some(CacheDomain::Asset));
        assert_eq!(CacheDomain::parse("image"), None);
    }

    #[test]
    fn only_assets_require_backing_files() {
        assert!(CacheDomain::Asset.requires_backing_file());
        assert!(!CacheDomain::Text.requires_backing_file());
        assert!(!CacheDomain::Search.requires_backing_file());
    }
}
