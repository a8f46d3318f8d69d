//! Runtime settings resolved through an ordered list of providers.
//!
//! The default cascade consults the durable settings table, then the process environment,
//! then static defaults from the loaded configuration. The first provider holding a
//! non-empty value that parses wins.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::application::repos::{RepoError, SettingsRepo};

const SOURCE: &str = "application::settings";

pub const KEY_MAX_ITEMS_PER_CYCLE: &str = "max_items_per_cycle";
pub const KEY_REQUIRE_MANUAL_APPROVAL: &str = "require_manual_approval";

#[async_trait]
pub trait SettingsProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn lookup(&self, key: &str) -> Result<Option<String>, RepoError>;
}

/// Durable settings table.
pub struct StoreSettingsProvider {
    repo: Arc<dyn SettingsRepo>,
}

impl StoreSettingsProvider {
    pub fn new(repo: Arc<dyn SettingsRepo>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl SettingsProvider for StoreSettingsProvider {
    fn name(&self) -> &'static str {
        "store"
    }

    async fn lookup(&self, key: &str) -> Result<Option<String>, RepoError> {
        self.repo.get_setting(key).await
    }
}

/// Process environment: `{prefix}{key}` first, then `{prefix}{KEY}`.
pub struct EnvSettingsProvider {
    prefix: String,
}

impl EnvSettingsProvider {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

#[async_trait]
impl SettingsProvider for EnvSettingsProvider {
    fn name(&self) -> &'static str {
        "env"
    }

    async fn lookup(&self, key: &str) -> Result<Option<String>, RepoError> {
        let exact = format!("{}{key}", self.prefix);
        let upper = format!("{}{}", self.prefix, key.to_ascii_uppercase());
        Ok(std::env::var(&exact).ok().or_else(|| std::env::var(&upper).ok()))
    }
}

/// Fixed values, usually the defaults from the loaded configuration.
#[derive(Debug, Default, Clone)]
pub struct StaticSettingsProvider {
    values: HashMap<String, String>,
}

impl StaticSettingsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }
}

#[async_trait]
impl SettingsProvider for StaticSettingsProvider {
    fn name(&self) -> &'static str {
        "defaults"
    }

    async fn lookup(&self, key: &str) -> Result<Option<String>, RepoError> {
        Ok(self.values.get(key).cloned())
    }
}

pub struct SettingsCascade {
    providers: Vec<Arc<dyn SettingsProvider>>,
}

impl SettingsCascade {
    pub fn new(providers: Vec<Arc<dyn SettingsProvider>>) -> Self {
        Self { providers }
    }

    /// Store, then environment (with `env_prefix`), then `defaults`.
    pub fn standard(
        repo: Arc<dyn SettingsRepo>,
        env_prefix: &str,
        defaults: StaticSettingsProvider,
    ) -> Self {
        Self::new(vec![
            Arc::new(StoreSettingsProvider::new(repo)),
            Arc::new(EnvSettingsProvider::new(env_prefix)),
            Arc::new(defaults),
        ])
    }

    /// First non-empty raw value. Provider failures are logged and skipped.
    pub async fn resolve(&self, key: &str) -> Option<String> {
        self.resolve_with(key, |value| Some(value.to_string())).await
    }

    /// First value that parses as `T`; unparsable values fall through to the next provider.
    pub async fn resolve_parsed<T: FromStr>(&self, key: &str) -> Option<T> {
        self.resolve_with(key, |value| value.parse().ok()).await
    }

    pub async fn resolve_bool(&self, key: &str) -> Option<bool> {
        self.resolve_with(key, parse_bool).await
    }

    async fn resolve_with<T>(&self, key: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        for provider in &self.providers {
            let raw = match provider.lookup(key).await {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(err) => {
                    warn!(
                        target = SOURCE,
                        key,
                        provider = provider.name(),
                        error = %err,
                        "settings provider failed; trying next"
                    );
                    continue;
                }
            };
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                continue;
            }
            match parse(trimmed) {
                Some(value) => {
                    debug!(target = SOURCE, key, provider = provider.name(), "setting resolved");
                    return Some(value);
                }
                None => warn!(
                    target = SOURCE,
                    key,
                    provider = provider.name(),
                    value = trimmed,
                    "ignoring unparsable setting"
                ),
            }
        }
        None
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
