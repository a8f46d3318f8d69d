//! Cache configuration.
//!
//! Per-domain TTLs, populated from the `[cache]` section of `rotativa.toml`.

use std::time::Duration;

use crate::domain::types::CacheDomain;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);
pub(crate) const DEFAULT_TEXT_TTL_DAYS: u32 = 7;
pub(crate) const DEFAULT_SEARCH_TTL_DAYS: u32 = 30;
pub(crate) const DEFAULT_ASSET_TTL_DAYS: u32 = 90;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub text_ttl: Duration,
    pub search_ttl: Duration,
    pub asset_ttl: Duration,
}

impl CacheConfig {
    pub fn ttl_for(&self, domain: CacheDomain) -> Duration {
        match domain {
            CacheDomain::Text => self.text_ttl,
            CacheDomain::Search => self.search_ttl,
            CacheDomain::Asset => self.asset_ttl,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            text_ttl: days(DEFAULT_TEXT_TTL_DAYS),
            search_ttl: days(DEFAULT_SEARCH_TTL_DAYS),
            asset_ttl: days(DEFAULT_ASSET_TTL_DAYS),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            text_ttl: days(settings.text_ttl_days.get()),
            search_ttl: days(settings.search_ttl_days.get()),
            asset_ttl: days(settings.asset_ttl_days.get()),
        }
    }
}

pub(crate) fn days(count: u32) -> Duration {
    DAY * count
}
