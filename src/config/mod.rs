//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{num::NonZeroU32, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

pub use cli::{
    ClearCacheArgs, CliArgs, Command, CommonArgs, CommonOverrides, InvalidateArgs, MaintainArgs,
    PruneHistoryArgs, SettingArgs,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "rotativa";
const ENV_PREFIX: &str = "ROTATIVA";
const DEFAULT_DATABASE_URL: &str = "sqlite://rotativa.db";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 4;
const DEFAULT_TEXT_TTL_DAYS: u32 = 7;
const DEFAULT_SEARCH_TTL_DAYS: u32 = 30;
const DEFAULT_ASSET_TTL_DAYS: u32 = 90;
const DEFAULT_FALLBACK_INTERVAL_MS: u64 = 1_000;
const DEFAULT_GENERATION_INTERVAL_MS: u64 = 2_000;
const DEFAULT_SEARCH_INTERVAL_MS: u64 = 2_000;
const DEFAULT_ASSET_INTERVAL_MS: u64 = 5_000;
const DEFAULT_DISCOVERY_INTERVAL_MS: u64 = 1_000;
const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 2_000;
const DEFAULT_RETRY_BACKOFF_MULTIPLIER: f64 = 2.0;
const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 10_000;
const DEFAULT_MAX_ITEMS_PER_CYCLE: u32 = 5;
const DEFAULT_FETCH_LIMIT: u32 = 15;
const DEFAULT_MIN_QUALITY_SCORE: f64 = 60.0;
const DEFAULT_SOURCE_EXCERPT_CHARS: u32 = 1_000;
const DEFAULT_SEARCH_KEYWORD_LIMIT: u32 = 3;
const DEFAULT_PLACEHOLDER_ASSET: &str = "assets/placeholder.png";
const DEFAULT_ASSET_PROMPT_STYLE: &str = "Editorial illustration";
const DEFAULT_ORIGINALITY_WINDOW_DAYS: u32 = 7;
const DEFAULT_ORIGINALITY_WINDOW_LIMIT: u32 = 50;
const DEFAULT_ORIGINALITY_THRESHOLD: f64 = 0.3;
const DEFAULT_HISTORY_DAYS: u32 = 90;
const DEFAULT_USAGE_DAYS: u32 = 30;
const DEFAULT_SWEEP_CRON: &str = "0 0 3 * * *";
const DEFAULT_CYCLE_INTERVAL_MINUTES: u32 = 120;
const DEFAULT_CYCLE_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_CYCLE_RETRY_DELAY_SECS: u64 = 60;
const SECONDS_PER_DAY: u64 = 24 * 60 * 60;
pub const MAX_DAYS: u32 = 36_500;

#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub rate_limit: RateLimitSettings,
    pub retry: RetrySettings,
    pub pipeline: PipelineSettings,
    pub originality: OriginalitySettings,
    pub retention: RetentionSettings,
    pub scheduler: SchedulerSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub text_ttl_days: NonZeroU32,
    pub search_ttl_days: NonZeroU32,
    pub asset_ttl_days: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub fallback_interval: Duration,
    pub generation_interval: Duration,
    pub search_interval: Duration,
    pub asset_interval: Duration,
    pub discovery_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct RetrySettings {
    pub max_attempts: NonZeroU32,
    pub base_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_items_per_cycle: NonZeroU32,
    pub fetch_limit: NonZeroU32,
    pub min_quality_score: f64,
    pub source_excerpt_chars: NonZeroU32,
    pub search_keyword_limit: NonZeroU32,
    pub generate_assets: bool,
    pub placeholder_asset: PathBuf,
    pub asset_prompt_style: String,
    pub require_manual_approval: bool,
    pub raw_response_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct OriginalitySettings {
    pub window: Duration,
    pub window_limit: NonZeroU32,
    pub threshold: f64,
    pub reject_source_copy: bool,
    pub reject_history_repeat: bool,
}

#[derive(Debug, Clone)]
pub struct RetentionSettings {
    pub history_days: NonZeroU32,
    pub usage_days: NonZeroU32,
    pub sweep_cron: String,
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub cycle_interval_minutes: u32,
    pub cycle_retry_attempts: NonZeroU32,
    pub cycle_retry_delay: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    if let Some(command) = cli.command.as_ref() {
        raw.apply_common_overrides(command.common());
        if let Command::Maintain(args) = command {
            raw.apply_maintain_overrides(args);
        }
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    rate_limit: RawRateLimitSettings,
    retry: RawRetrySettings,
    pipeline: RawPipelineSettings,
    originality: RawOriginalitySettings,
    retention: RawRetentionSettings,
    scheduler: RawSchedulerSettings,
}

impl RawSettings {
    fn apply_common_overrides(&mut self, overrides: &CommonOverrides) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }

    fn apply_maintain_overrides(&mut self, overrides: &MaintainArgs) {
        if let Some(cron) = overrides.sweep_cron.as_ref() {
            self.retention.sweep_cron = Some(cron.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            cache,
            rate_limit,
            retry,
            pipeline,
            originality,
            retention,
            scheduler,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
            rate_limit: build_rate_limit_settings(rate_limit),
            retry: build_retry_settings(retry)?,
            pipeline: build_pipeline_settings(pipeline)?,
            originality: build_originality_settings(originality)?,
            retention: build_retention_settings(retention)?,
            scheduler: build_scheduler_settings(scheduler)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database
        .url
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
    if !url.starts_with("sqlite:") {
        return Err(LoadError::invalid(
            "database.url",
            format!("expected a sqlite: URL, got `{url}`"),
        ));
    }

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    Ok(CacheSettings {
        text_ttl_days: day_count(
            cache.text_ttl_days.unwrap_or(DEFAULT_TEXT_TTL_DAYS).into(),
            "cache.text_ttl_days",
        )?,
        search_ttl_days: day_count(
            cache.search_ttl_days.unwrap_or(DEFAULT_SEARCH_TTL_DAYS).into(),
            "cache.search_ttl_days",
        )?,
        asset_ttl_days: day_count(
            cache.asset_ttl_days.unwrap_or(DEFAULT_ASSET_TTL_DAYS).into(),
            "cache.asset_ttl_days",
        )?,
    })
}

fn build_rate_limit_settings(rate_limit: RawRateLimitSettings) -> RateLimitSettings {
    let interval = |value: Option<u64>, default: u64| Duration::from_millis(value.unwrap_or(default));

    RateLimitSettings {
        fallback_interval: interval(rate_limit.fallback_interval_ms, DEFAULT_FALLBACK_INTERVAL_MS),
        generation_interval: interval(
            rate_limit.generation_interval_ms,
            DEFAULT_GENERATION_INTERVAL_MS,
        ),
        search_interval: interval(rate_limit.search_interval_ms, DEFAULT_SEARCH_INTERVAL_MS),
        asset_interval: interval(rate_limit.asset_interval_ms, DEFAULT_ASSET_INTERVAL_MS),
        discovery_interval: interval(
            rate_limit.discovery_interval_ms,
            DEFAULT_DISCOVERY_INTERVAL_MS,
        ),
    }
}

fn build_retry_settings(retry: RawRetrySettings) -> Result<RetrySettings, LoadError> {
    let max_attempts = non_zero_u32(
        retry.max_attempts.unwrap_or(DEFAULT_RETRY_MAX_ATTEMPTS).into(),
        "retry.max_attempts",
    )?;

    let backoff_multiplier = retry
        .backoff_multiplier
        .unwrap_or(DEFAULT_RETRY_BACKOFF_MULTIPLIER);
    if !backoff_multiplier.is_finite() || backoff_multiplier < 1.0 {
        return Err(LoadError::invalid(
            "retry.backoff_multiplier",
            "must be a finite number of at least 1.0",
        ));
    }

    let base_delay = Duration::from_millis(retry.base_delay_ms.unwrap_or(DEFAULT_RETRY_BASE_DELAY_MS));
    let max_delay = Duration::from_millis(retry.max_delay_ms.unwrap_or(DEFAULT_RETRY_MAX_DELAY_MS));
    if max_delay < base_delay {
        return Err(LoadError::invalid(
            "retry.max_delay_ms",
            "must not be shorter than retry.base_delay_ms",
        ));
    }

    Ok(RetrySettings {
        max_attempts,
        base_delay,
        backoff_multiplier,
        max_delay,
    })
}

fn build_pipeline_settings(pipeline: RawPipelineSettings) -> Result<PipelineSettings, LoadError> {
    let min_quality_score = pipeline
        .min_quality_score
        .unwrap_or(DEFAULT_MIN_QUALITY_SCORE);
    if !(0.0..=100.0).contains(&min_quality_score) {
        return Err(LoadError::invalid(
            "pipeline.min_quality_score",
            "must be between 0 and 100",
        ));
    }

    let placeholder_asset = pipeline
        .placeholder_asset
        .unwrap_or_else(|| PathBuf::from(DEFAULT_PLACEHOLDER_ASSET));
    if placeholder_asset.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "pipeline.placeholder_asset",
            "path must not be empty",
        ));
    }

    let asset_prompt_style = pipeline
        .asset_prompt_style
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_ASSET_PROMPT_STYLE.to_string());

    Ok(PipelineSettings {
        max_items_per_cycle: non_zero_u32(
            pipeline
                .max_items_per_cycle
                .unwrap_or(DEFAULT_MAX_ITEMS_PER_CYCLE)
                .into(),
            "pipeline.max_items_per_cycle",
        )?,
        fetch_limit: non_zero_u32(
            pipeline.fetch_limit.unwrap_or(DEFAULT_FETCH_LIMIT).into(),
            "pipeline.fetch_limit",
        )?,
        min_quality_score,
        source_excerpt_chars: non_zero_u32(
            pipeline
                .source_excerpt_chars
                .unwrap_or(DEFAULT_SOURCE_EXCERPT_CHARS)
                .into(),
            "pipeline.source_excerpt_chars",
        )?,
        search_keyword_limit: non_zero_u32(
            pipeline
                .search_keyword_limit
                .unwrap_or(DEFAULT_SEARCH_KEYWORD_LIMIT)
                .into(),
            "pipeline.search_keyword_limit",
        )?,
        generate_assets: pipeline.generate_assets.unwrap_or(true),
        placeholder_asset,
        asset_prompt_style,
        require_manual_approval: pipeline.require_manual_approval.unwrap_or(true),
        raw_response_dir: pipeline
            .raw_response_dir
            .filter(|path| !path.as_os_str().is_empty()),
    })
}

fn build_originality_settings(
    originality: RawOriginalitySettings,
) -> Result<OriginalitySettings, LoadError> {
    let window_days = day_count(
        originality
            .window_days
            .unwrap_or(DEFAULT_ORIGINALITY_WINDOW_DAYS)
            .into(),
        "originality.window_days",
    )?;

    let threshold = originality
        .threshold
        .unwrap_or(DEFAULT_ORIGINALITY_THRESHOLD);
    if !(0.0..=1.0).contains(&threshold) {
        return Err(LoadError::invalid(
            "originality.threshold",
            "must be between 0.0 and 1.0",
        ));
    }

    Ok(OriginalitySettings {
        window: Duration::from_secs(u64::from(window_days.get()) * SECONDS_PER_DAY),
        window_limit: non_zero_u32(
            originality
                .window_limit
                .unwrap_or(DEFAULT_ORIGINALITY_WINDOW_LIMIT)
                .into(),
            "originality.window_limit",
        )?,
        threshold,
        reject_source_copy: originality.reject_source_copy.unwrap_or(true),
        reject_history_repeat: originality.reject_history_repeat.unwrap_or(false),
    })
}

fn build_retention_settings(retention: RawRetentionSettings) -> Result<RetentionSettings, LoadError> {
    let sweep_cron = retention
        .sweep_cron
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_SWEEP_CRON.to_string());
    if sweep_cron.split_whitespace().count() < 6 {
        return Err(LoadError::invalid(
            "retention.sweep_cron",
            "expected at least six fields (sec min hour day month weekday)",
        ));
    }

    Ok(RetentionSettings {
        history_days: day_count(
            retention.history_days.unwrap_or(DEFAULT_HISTORY_DAYS).into(),
            "retention.history_days",
        )?,
        usage_days: day_count(
            retention.usage_days.unwrap_or(DEFAULT_USAGE_DAYS).into(),
            "retention.usage_days",
        )?,
        sweep_cron,
    })
}

fn build_scheduler_settings(scheduler: RawSchedulerSettings) -> Result<SchedulerSettings, LoadError> {
    let cycle_interval_minutes = scheduler
        .cycle_interval_minutes
        .unwrap_or(DEFAULT_CYCLE_INTERVAL_MINUTES);
    let in_range = (30..=1440).contains(&cycle_interval_minutes);
    let expressible = cycle_interval_minutes < 60 || cycle_interval_minutes % 60 == 0;
    if !in_range || !expressible {
        return Err(LoadError::invalid(
            "scheduler.cycle_interval_minutes",
            "must be 30-59 minutes or a whole number of hours up to 24",
        ));
    }

    let retry_delay_secs = scheduler
        .cycle_retry_delay_seconds
        .unwrap_or(DEFAULT_CYCLE_RETRY_DELAY_SECS);
    if retry_delay_secs == 0 {
        return Err(LoadError::invalid(
            "scheduler.cycle_retry_delay_seconds",
            "must be greater than zero",
        ));
    }

    Ok(SchedulerSettings {
        cycle_interval_minutes,
        cycle_retry_attempts: non_zero_u32(
            scheduler
                .cycle_retry_attempts
                .unwrap_or(DEFAULT_CYCLE_RETRY_ATTEMPTS)
                .into(),
            "scheduler.cycle_retry_attempts",
        )?,
        cycle_retry_delay: Duration::from_secs(retry_delay_secs),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    text_ttl_days: Option<u32>,
    search_ttl_days: Option<u32>,
    asset_ttl_days: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRateLimitSettings {
    fallback_interval_ms: Option<u64>,
    generation_interval_ms: Option<u64>,
    search_interval_ms: Option<u64>,
    asset_interval_ms: Option<u64>,
    discovery_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRetrySettings {
    max_attempts: Option<u32>,
    base_delay_ms: Option<u64>,
    backoff_multiplier: Option<f64>,
    max_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPipelineSettings {
    max_items_per_cycle: Option<u32>,
    fetch_limit: Option<u32>,
    min_quality_score: Option<f64>,
    source_excerpt_chars: Option<u32>,
    search_keyword_limit: Option<u32>,
    generate_assets: Option<bool>,
    placeholder_asset: Option<PathBuf>,
    asset_prompt_style: Option<String>,
    require_manual_approval: Option<bool>,
    raw_response_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawOriginalitySettings {
    window_days: Option<u32>,
    window_limit: Option<u32>,
    threshold: Option<f64>,
    reject_source_copy: Option<bool>,
    reject_history_repeat: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRetentionSettings {
    history_days: Option<u32>,
    usage_days: Option<u32>,
    sweep_cron: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSchedulerSettings {
    cycle_interval_minutes: Option<u32>,
    cycle_retry_attempts: Option<u32>,
    cycle_retry_delay_seconds: Option<u64>,
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn day_count(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    let days = non_zero_u32(value, key)?;
    if days.get() > MAX_DAYS {
        return Err(LoadError::invalid(key, format!("must not exceed {MAX_DAYS} days")));
    }
    Ok(days)
}

#[cfg(test)]
mod tests;
