use std::sync::Arc;
use std::time::Duration;

use rotativa::application::clock::{Clock, ManualClock};
use rotativa::application::rate_limit::{RateLimiter, ServiceLimits};
use rotativa::application::repos::{CacheRepo, HistoryRepo, RateLimitRepo, SettingsRepo};
use rotativa::application::retention::{RetentionConfig, RetentionSweeper};
use rotativa::cache::{AssetRef, KeyedCache};
use rotativa::domain::entities::ProducedItemRecord;
use rotativa::domain::types::{CacheDomain, RoutingMode};
use rotativa::infra::db::SqliteRepositories;
use time::OffsetDateTime;
use time::macros::{date, datetime};
use uuid::Uuid;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

async fn store() -> Arc<SqliteRepositories> {
    Arc::new(
        SqliteRepositories::in_memory()
            .await
            .expect("in-memory database with migrations"),
    )
}

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(datetime!(2026-05-10 12:00 UTC)))
}

fn record(source: &str, produced_at: OffsetDateTime) -> ProducedItemRecord {
    ProducedItemRecord {
        id: Uuid::new_v4(),
        source_hash: source.to_string(),
        content_hash: format!("content-{source}"),
        content_snippet: format!("snippet for {source}"),
        locator: format!("https://news.example/{source}"),
        title: format!("Title {source}"),
        source_name: "Example Wire".to_string(),
        routed_locator: format!("review://{source}"),
        routing_mode: RoutingMode::Review,
        quality_score: 71.5,
        originality_score: 0.82,
        produced_at,
    }
}

#[tokio::test]
async fn text_cache_round_trip_counts_hits_and_expires() {
    let store = store().await;
    let clock = clock();
    let cache: KeyedCache<String> = KeyedCache::new(
        CacheDomain::Text,
        DAY * 7,
        store.clone(),
        clock.clone(),
    );

    let fields = ["https://news.example/a", "Headline", "excerpt", "provider-1"];
    cache
        .put(&fields, &"generated".to_string(), None)
        .await
        .expect("put");

    let first = cache.get(&fields).await.expect("get").expect("hit");
    assert_eq!(first.payload, "generated");
    assert_eq!(first.hit_count, 1);
    let second = cache.get(&fields).await.expect("get").expect("hit");
    assert_eq!(second.hit_count, 2);

    clock.advance(DAY * 8);
    assert!(cache.get(&fields).await.expect("get").is_none());

    let expired = store
        .list_expired(CacheDomain::Text, clock.now())
        .await
        .expect("list expired");
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].fingerprint, cache.fingerprint(&fields));
}

#[tokio::test]
async fn invalidated_entry_misses_until_rewritten() {
    let store = store().await;
    let clock = clock();
    let cache: KeyedCache<String> =
        KeyedCache::new(CacheDomain::Search, DAY * 30, store.clone(), clock.clone());

    let fields = ["Headline", "rust cargo"];
    let key = cache
        .put(&fields, &"https://related.example/1".to_string(), None)
        .await
        .expect("put");

    assert!(cache.invalidate(&key).await.expect("invalidate"));
    assert!(cache.get(&fields).await.expect("get").is_none());

    cache
        .put(&fields, &"https://related.example/2".to_string(), None)
        .await
        .expect("rewrite");
    let hit = cache.get(&fields).await.expect("get").expect("hit after rewrite");
    assert_eq!(hit.payload, "https://related.example/2");
    assert_eq!(hit.hit_count, 1);
}

#[tokio::test]
async fn domain_counts_and_clear() {
    let store = store().await;
    let clock = clock();
    let cache: KeyedCache<String> =
        KeyedCache::new(CacheDomain::Search, DAY * 30, store.clone(), clock.clone());

    cache.put(&["a"], &"one".to_string(), None).await.expect("put");
    cache.put(&["b"], &"two".to_string(), None).await.expect("put");
    cache.get(&["a"]).await.expect("get");

    let stats = cache.stats().await.expect("stats");
    assert_eq!(stats.count, 2);
    assert_eq!(stats.entries_with_hits, 1);
    assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);

    assert_eq!(cache.clear().await.expect("clear"), 2);
    assert_eq!(cache.stats().await.expect("stats").count, 0);
}

#[tokio::test]
async fn sweeper_removes_expired_assets_and_their_files() {
    let store = store().await;
    let clock = clock();
    let dir = tempfile::tempdir().expect("tempdir");
    let present = dir.path().join("present.png");
    std::fs::write(&present, vec![0_u8; 64]).expect("write asset");
    let gone = dir.path().join("gone.png");

    let cache: KeyedCache<AssetRef> =
        KeyedCache::new(CacheDomain::Asset, DAY * 90, store.clone(), clock.clone());
    cache
        .put(&["present"], &AssetRef { path: present.clone() }, None)
        .await
        .expect("put");
    cache
        .put(&["gone"], &AssetRef { path: gone.clone() }, None)
        .await
        .expect("put");

    clock.advance(DAY * 91);
    let sweeper = RetentionSweeper::new(
        store.clone(),
        store.clone(),
        store.clone(),
        clock.clone(),
        RetentionConfig::default(),
    );
    let report = sweeper.sweep_expired().await.expect("sweep");

    assert_eq!(report.deleted_for(CacheDomain::Asset), 2);
    assert!(report.reclaimed_bytes() >= 64);
    assert!(!present.exists());
    assert_eq!(
        store
            .domain_counts(CacheDomain::Asset)
            .await
            .expect("counts")
            .entries,
        0
    );
}

#[tokio::test]
async fn rate_limit_timestamps_and_usage_persist() {
    let store = store().await;
    let at = datetime!(2026-05-10 12:00:01.250 UTC);

    assert!(store.last_request_at("search").await.expect("read").is_none());
    store.mark_request("search", at).await.expect("mark");
    assert_eq!(store.last_request_at("search").await.expect("read"), Some(at));

    let day = date!(2026 - 05 - 10);
    store.record_usage("generation", day, 1, 120).await.expect("usage");
    store.record_usage("generation", day, 2, 30).await.expect("usage");
    let usage = store
        .usage_for_day("generation", day)
        .await
        .expect("read usage")
        .expect("usage row");
    assert_eq!((usage.calls, usage.tokens), (3, 150));

    store
        .record_usage("generation", date!(2026 - 04 - 01), 1, 1)
        .await
        .expect("usage");
    assert_eq!(store.prune_usage(date!(2026 - 05 - 01)).await.expect("prune"), 1);
}

#[tokio::test]
async fn limiter_spaces_calls_using_the_persisted_timestamp() {
    let store = store().await;
    let clock = clock();
    let limiter = RateLimiter::new(store.clone(), clock.clone(), ServiceLimits::default());

    limiter.acquire("svc", Duration::from_secs(2)).await;
    let started = clock.now();
    let waited = limiter.acquire("svc", Duration::from_secs(2)).await;

    assert_eq!(waited, Duration::from_secs(2));
    assert!((clock.now() - started).whole_seconds() >= 2);
}

#[tokio::test]
async fn history_insert_is_idempotent_per_source() {
    let store = store().await;
    let now = datetime!(2026-05-10 12:00 UTC);

    assert!(store.insert_produced(record("a", now)).await.expect("insert"));
    assert!(!store.insert_produced(record("a", now)).await.expect("insert"));
    assert!(store.source_exists("a").await.expect("exists"));
    assert!(!store.source_exists("b").await.expect("exists"));
    assert!(store.content_exists("content-a").await.expect("exists"));
}

#[tokio::test]
async fn recent_history_is_newest_first_and_capped() {
    let store = store().await;
    let now = datetime!(2026-05-10 12:00 UTC);

    for (index, source) in ["old", "mid", "new"].into_iter().enumerate() {
        store
            .insert_produced(record(source, now - DAY * (3 - index as u32)))
            .await
            .expect("insert");
    }
    store
        .insert_produced(record("ancient", now - DAY * 30))
        .await
        .expect("insert");

    let recent = store
        .recent_produced(now - DAY * 7, 2)
        .await
        .expect("recent");
    let sources: Vec<_> = recent.iter().map(|r| r.source_hash.as_str()).collect();
    assert_eq!(sources, vec!["new", "mid"]);
    assert_eq!(recent[0].routing_mode, RoutingMode::Review);

    assert_eq!(store.prune_produced(now - DAY * 7).await.expect("prune"), 1);
}

#[tokio::test]
async fn settings_upsert_overwrites() {
    let store = store().await;

    assert!(store.get_setting("max_items_per_cycle").await.expect("get").is_none());
    store.put_setting("max_items_per_cycle", "3").await.expect("put");
    store.put_setting("max_items_per_cycle", "4").await.expect("put");
    assert_eq!(
        store.get_setting("max_items_per_cycle").await.expect("get").as_deref(),
        Some("4")
    );
}
