//! Rotativa cache system
//!
//! Persistent, TTL-bounded caches keyed by content fingerprints. Three fixed domains exist:
//!
//! - **text**: structured generator results (default TTL 7 days)
//! - **search**: related-content lookups (default TTL 30 days)
//! - **asset**: generated asset files (default TTL 90 days; a hit requires the file on disk)
//!
//! ```toml
//! [cache]
//! text_ttl_days = 7
//! search_ttl_days = 30
//! asset_ttl_days = 90
//! ```

mod config;
mod keys;
mod store;

pub use config::CacheConfig;
pub use keys::{digest_hex, fingerprint, input_summary};
pub use store::{AssetRef, CacheError, CacheHit, CachePayload, CacheStats, KeyedCache};
