use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

use crate::domain::types::CacheDomain;

/// Command-line arguments for the rotativa binary.
#[derive(Debug, Parser)]
#[command(
    name = "rotativa",
    version,
    about = "Rotativa content pipeline maintenance"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "ROTATIVA_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the scheduled retention sweeper until interrupted.
    Maintain(MaintainArgs),
    /// Delete expired cache entries and their asset files once.
    Sweep(CommonArgs),
    /// Delete produced-item history older than the given age.
    #[command(name = "prune-history")]
    PruneHistory(PruneHistoryArgs),
    /// Print cache statistics for every domain as JSON.
    Stats(CommonArgs),
    /// Delete every entry of one cache domain, or of all domains.
    #[command(name = "clear-cache")]
    ClearCache(ClearCacheArgs),
    /// Flag one cache entry as invalid.
    Invalidate(InvalidateArgs),
    /// Read or write a durable runtime setting.
    Setting(SettingArgs),
}

impl Command {
    pub fn common(&self) -> &CommonOverrides {
        match self {
            Command::Maintain(args) => &args.common,
            Command::Sweep(args) | Command::Stats(args) => &args.common,
            Command::PruneHistory(args) => &args.common,
            Command::ClearCache(args) => &args.common,
            Command::Invalidate(args) => &args.common,
            Command::Setting(args) => &args.common,
        }
    }
}

#[derive(Debug, Args, Default, Clone)]
pub struct CommonOverrides {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct CommonArgs {
    #[command(flatten)]
    pub common: CommonOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct MaintainArgs {
    #[command(flatten)]
    pub common: CommonOverrides,

    /// Override the sweep cron expression (sec min hour day month weekday).
    #[arg(long = "sweep-cron", value_name = "CRON")]
    pub sweep_cron: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct PruneHistoryArgs {
    #[command(flatten)]
    pub common: CommonOverrides,

    /// Age in days; defaults to `retention.history_days`.
    #[arg(
        long,
        value_name = "DAYS",
        value_parser = clap::value_parser!(u32).range(1..=i64::from(super::MAX_DAYS))
    )]
    pub days: Option<u32>,
}

#[derive(Debug, Args, Clone)]
pub struct ClearCacheArgs {
    #[command(flatten)]
    pub common: CommonOverrides,

    /// Domain to clear (text|search|asset); all domains when omitted.
    #[arg(long, value_name = "DOMAIN", value_parser = parse_domain)]
    pub domain: Option<CacheDomain>,
}

#[derive(Debug, Args, Clone)]
pub struct InvalidateArgs {
    #[command(flatten)]
    pub common: CommonOverrides,

    #[arg(long, value_name = "DOMAIN", value_parser = parse_domain)]
    pub domain: CacheDomain,

    /// Hex fingerprint of the entry.
    #[arg(value_name = "FINGERPRINT")]
    pub fingerprint: String,
}

#[derive(Debug, Args, Clone)]
pub struct SettingArgs {
    #[command(flatten)]
    pub common: CommonOverrides,

    #[arg(value_name = "KEY")]
    pub key: String,

    /// New value; the current value is printed when omitted.
    #[arg(value_name = "VALUE")]
    pub value: Option<String>,
}

fn parse_domain(value: &str) -> Result<CacheDomain, String> {
    CacheDomain::parse(value)
        .ok_or_else(|| format!("unknown cache domain `{value}` (expected text, search or asset)"))
}
