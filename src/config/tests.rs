use super::*;
use crate::domain::types::CacheDomain;

#[test]
fn defaults_match_documented_values() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.database.url, DEFAULT_DATABASE_URL);
    assert_eq!(settings.cache.text_ttl_days.get(), 7);
    assert_eq!(settings.cache.search_ttl_days.get(), 30);
    assert_eq!(settings.cache.asset_ttl_days.get(), 90);
    assert_eq!(settings.pipeline.max_items_per_cycle.get(), 5);
    assert!(settings.pipeline.require_manual_approval);
    assert_eq!(settings.originality.window_limit.get(), 50);
    assert_eq!(
        settings.originality.window,
        Duration::from_secs(7 * SECONDS_PER_DAY)
    );
    assert!((settings.originality.threshold - 0.3).abs() < f64::EPSILON);
    assert_eq!(settings.retry.max_attempts.get(), 3);
    assert_eq!(settings.retry.base_delay, Duration::from_secs(2));
    assert_eq!(settings.retry.max_delay, Duration::from_secs(10));
    assert_eq!(settings.retention.sweep_cron, DEFAULT_SWEEP_CRON);
    assert_eq!(settings.scheduler.cycle_interval_minutes, 120);
    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert_eq!(settings.logging.format, LogFormat::Compact);
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.database.url = Some("sqlite://from-file.db".to_string());
    raw.logging.level = Some("info".to_string());

    let overrides = CommonOverrides {
        database_url: Some("sqlite://from-cli.db".to_string()),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_common_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.database.url, "sqlite://from-cli.db");
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = CommonOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_common_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn maintain_override_replaces_sweep_cron() {
    let mut raw = RawSettings::default();
    let overrides = MaintainArgs {
        sweep_cron: Some("0 30 4 * * *".to_string()),
        ..Default::default()
    };

    raw.apply_maintain_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.retention.sweep_cron, "0 30 4 * * *");
}

#[test]
fn zero_budget_is_rejected() {
    let mut raw = RawSettings::default();
    raw.pipeline.max_items_per_cycle = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero budget must fail");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "pipeline.max_items_per_cycle",
            ..
        }
    ));
}

#[test]
fn threshold_outside_unit_interval_is_rejected() {
    let mut raw = RawSettings::default();
    raw.originality.threshold = Some(1.5);

    let err = Settings::from_raw(raw).expect_err("threshold must fail");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "originality.threshold",
            ..
        }
    ));
}

#[test]
fn non_sqlite_database_url_is_rejected() {
    let mut raw = RawSettings::default();
    raw.database.url = Some("postgres://localhost/rotativa".to_string());

    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn cycle_interval_must_be_schedulable() {
    for minutes in [29_u32, 90, 1441] {
        let mut raw = RawSettings::default();
        raw.scheduler.cycle_interval_minutes = Some(minutes);
        assert!(
            Settings::from_raw(raw).is_err(),
            "{minutes} minutes should be rejected"
        );
    }

    for minutes in [30_u32, 45, 60, 180, 1440] {
        let mut raw = RawSettings::default();
        raw.scheduler.cycle_interval_minutes = Some(minutes);
        assert!(
            Settings::from_raw(raw).is_ok(),
            "{minutes} minutes should be accepted"
        );
    }
}

#[test]
fn backoff_multiplier_below_one_is_rejected() {
    let mut raw = RawSettings::default();
    raw.retry.backoff_multiplier = Some(0.5);

    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn day_settings_are_bounded() {
    let mut raw = RawSettings::default();
    raw.retention.history_days = Some(5_000_000);
    let err = Settings::from_raw(raw).expect_err("history days must be bounded");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "retention.history_days",
            ..
        }
    ));

    let mut raw = RawSettings::default();
    raw.cache.asset_ttl_days = Some(MAX_DAYS + 1);
    assert!(Settings::from_raw(raw).is_err());

    let mut raw = RawSettings::default();
    raw.originality.window_days = Some(MAX_DAYS);
    assert!(Settings::from_raw(raw).is_ok());
}

#[test]
fn prune_history_days_are_bounded() {
    let result =
        CliArgs::try_parse_from(["rotativa", "prune-history", "--days", "5000000"]);
    assert!(result.is_err());
    let result = CliArgs::try_parse_from(["rotativa", "prune-history", "--days", "0"]);
    assert!(result.is_err());
}

#[test]
fn no_subcommand_leaves_command_empty() {
    let args = CliArgs::parse_from(["rotativa"]);
    assert!(args.command.is_none());
}

#[test]
fn parse_maintain_arguments() {
    let args = CliArgs::parse_from([
        "rotativa",
        "maintain",
        "--database-url",
        "sqlite::memory:",
        "--sweep-cron",
        "0 0 4 * * *",
    ]);

    match args.command.expect("maintain command") {
        Command::Maintain(args) => {
            assert_eq!(args.common.database_url.as_deref(), Some("sqlite::memory:"));
            assert_eq!(args.sweep_cron.as_deref(), Some("0 0 4 * * *"));
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn parse_prune_history_arguments() {
    let args = CliArgs::parse_from(["rotativa", "prune-history", "--days", "14"]);

    match args.command.expect("prune-history command") {
        Command::PruneHistory(args) => assert_eq!(args.days, Some(14)),
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn parse_invalidate_arguments() {
    let args = CliArgs::parse_from(["rotativa", "invalidate", "--domain", "search", "abc123"]);

    match args.command.expect("invalidate command") {
        Command::Invalidate(args) => {
            assert_eq!(args.domain, CacheDomain::Search);
            assert_eq!(args.fingerprint, "abc123");
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn clear_cache_rejects_unknown_domain() {
    let result = CliArgs::try_parse_from(["rotativa", "clear-cache", "--domain", "video"]);
    assert!(result.is_err());
}

#[test]
fn parse_setting_arguments() {
    let args = CliArgs::parse_from(["rotativa", "setting", "max_items_per_cycle", "3"]);

    match args.command.expect("setting command") {
        Command::Setting(args) => {
            assert_eq!(args.key, "max_items_per_cycle");
            assert_eq!(args.value.as_deref(), Some("3"));
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn explicit_config_file_is_layered() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("rotativa-test.toml");
    std::fs::write(
        &path,
        "[pipeline]\nmax_items_per_cycle = 2\n\n[cache]\ntext_ttl_days = 3\n",
    )
    .expect("write config");

    let cli = CliArgs::parse_from([
        "rotativa".to_string(),
        "--config-file".to_string(),
        path.display().to_string(),
        "stats".to_string(),
    ]);
    let settings = load(&cli).expect("settings load");

    assert_eq!(settings.pipeline.max_items_per_cycle.get(), 2);
    assert_eq!(settings.cache.text_ttl_days.get(), 3);
}
