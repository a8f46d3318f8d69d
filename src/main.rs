use std::{process, sync::Arc};

use rotativa::{
    application::{
        clock::{Clock, SystemClock},
        error::AppError,
        jobs::{SweepJobContext, job_gate, spawn_job_monitor, sweep_schedule},
        pipeline::PipelineCaches,
        repos::{CacheRepo, HistoryRepo, RateLimitRepo, SettingsRepo},
        retention::{RetentionConfig, RetentionSweeper},
    },
    cache::CacheConfig,
    config::{self, Command, Settings},
    domain::{entities::SettingRecord, types::CacheDomain},
    infra::{db::SqliteRepositories, error::InfraError, telemetry},
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

const SOURCE: &str = "rotativa::main";

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    let chain = error.messages().join(": ");
    if dispatcher::has_been_set() {
        error!(error = %chain, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %chain, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli().map_err(|err| {
        AppError::from(InfraError::configuration(format!(
            "failed to load configuration: {err}"
        )))
    })?;

    let command = cli_args
        .command
        .unwrap_or(Command::Maintain(config::MaintainArgs::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    let repositories = connect(&settings).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    match command {
        Command::Maintain(_) => run_maintain(&settings, repositories, clock).await,
        Command::Sweep(_) => {
            let report = sweeper(&settings, repositories, clock)
                .sweep_expired()
                .await?;
            print_json(&report)
        }
        Command::PruneHistory(args) => {
            let days = args.days.unwrap_or(settings.retention.history_days.get());
            if days == 0 {
                return Err(AppError::validation("--days must be greater than zero"));
            }
            let removed = sweeper(&settings, repositories, clock)
                .prune_history(days)
                .await?;
            print_json(&serde_json::json!({ "older_than_days": days, "removed": removed }))
        }
        Command::Stats(_) => {
            let stats = caches(&settings, repositories, clock).stats().await?;
            print_json(&stats)
        }
        Command::ClearCache(args) => {
            let caches = caches(&settings, repositories, clock);
            let domains = match args.domain {
                Some(domain) => vec![domain],
                None => CacheDomain::ALL.to_vec(),
            };
            let mut cleared = serde_json::Map::new();
            for domain in domains {
                let removed = caches.clear(domain).await?;
                info!(target = SOURCE, domain = %domain, removed, "cache domain cleared");
                cleared.insert(domain.as_str().to_string(), removed.into());
            }
            print_json(&cleared)
        }
        Command::Invalidate(args) => {
            let touched = caches(&settings, repositories, clock)
                .invalidate(args.domain, args.fingerprint.trim())
                .await?;
            if !touched {
                return Err(AppError::NotFound);
            }
            print_json(&serde_json::json!({
                "domain": args.domain,
                "fingerprint": args.fingerprint.trim(),
                "invalidated": true,
            }))
        }
        Command::Setting(args) => run_setting(repositories, args).await,
    }
}

async fn connect(settings: &Settings) -> Result<SqliteRepositories, AppError> {
    let pool = SqliteRepositories::connect(
        &settings.database.url,
        settings.database.max_connections.get(),
    )
    .await
    .map_err(InfraError::from)?;
    SqliteRepositories::run_migrations(&pool)
        .await
        .map_err(InfraError::from)?;
    let repositories = SqliteRepositories::new(pool);
    repositories
        .health_check()
        .await
        .map_err(InfraError::from)?;
    info!(
        target = SOURCE,
        url = settings.database.url.as_str(),
        "database ready"
    );
    Ok(repositories)
}

fn sweeper(
    settings: &Settings,
    repositories: SqliteRepositories,
    clock: Arc<dyn Clock>,
) -> RetentionSweeper {
    let cache: Arc<dyn CacheRepo> = Arc::new(repositories.clone());
    let history: Arc<dyn HistoryRepo> = Arc::new(repositories.clone());
    let usage: Arc<dyn RateLimitRepo> = Arc::new(repositories);
    RetentionSweeper::new(
        cache,
        history,
        usage,
        clock,
        RetentionConfig::from(&settings.retention),
    )
}

fn caches(
    settings: &Settings,
    repositories: SqliteRepositories,
    clock: Arc<dyn Clock>,
) -> PipelineCaches {
    let repo: Arc<dyn CacheRepo> = Arc::new(repositories);
    PipelineCaches::new(repo, clock, &CacheConfig::from(&settings.cache))
}

async fn run_maintain(
    settings: &Settings,
    repositories: SqliteRepositories,
    clock: Arc<dyn Clock>,
) -> Result<(), AppError> {
    let schedule = sweep_schedule(&settings.retention.sweep_cron)?;
    let context = SweepJobContext {
        sweeper: Arc::new(sweeper(settings, repositories, clock)),
        gate: job_gate(),
    };

    let monitor = spawn_job_monitor(None, context, schedule);
    info!(
        target = SOURCE,
        cron = settings.retention.sweep_cron.as_str(),
        "retention sweeper scheduled"
    );

    tokio::signal::ctrl_c()
        .await
        .map_err(|err| AppError::unexpected(format!("failed to listen for shutdown: {err}")))?;
    info!(target = SOURCE, "shutdown requested");
    monitor.abort();
    Ok(())
}

async fn run_setting(
    repositories: SqliteRepositories,
    args: config::SettingArgs,
) -> Result<(), AppError> {
    let key = args.key.trim();
    if key.is_empty() {
        return Err(AppError::validation("setting key must not be empty"));
    }

    match args.value {
        Some(value) => {
            let record = SettingRecord {
                key: key.to_string(),
                value: value.trim().to_string(),
            };
            repositories.put_setting(&record.key, &record.value).await?;
            info!(target = SOURCE, key, "setting stored");
            print_json(&record)
        }
        None => match repositories.get_setting(key).await? {
            Some(value) => print_json(&SettingRecord {
                key: key.to_string(),
                value,
            }),
            None => Err(AppError::NotFound),
        },
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to render output: {err}")))?;
    println!("{rendered}");
    Ok(())
}
