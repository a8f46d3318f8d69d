use async_trait::async_trait;
use time::{Date, OffsetDateTime};

use crate::{
    application::repos::{RateLimitRepo, RepoError},
    domain::entities::UsageRecord,
};

use super::{
    SqliteRepositories, map_sqlx_error,
    util::{day_key, from_millis, parse_day_key, to_count, to_millis},
};

#[derive(sqlx::FromRow)]
struct UsageRow {
    service: String,
    day: String,
    calls: i64,
    tokens: i64,
}

impl TryFrom<UsageRow> for UsageRecord {
    type Error = RepoError;

    fn try_from(row: UsageRow) -> Result<Self, Self::Error> {
        Ok(Self {
            service: row.service,
            day: parse_day_key(&row.day)?,
            calls: to_count(row.calls)?,
            tokens: to_count(row.tokens)?,
        })
    }
}

fn to_stored(value: u64) -> Result<i64, RepoError> {
    i64::try_from(value).map_err(|_| RepoError::InvalidInput {
        message: format!("usage increment {value} exceeds supported range"),
    })
}

#[async_trait]
impl RateLimitRepo for SqliteRepositories {
    async fn last_request_at(&self, service: &str) -> Result<Option<OffsetDateTime>, RepoError> {
        let stored = sqlx::query_scalar::<_, i64>(
            "SELECT last_request_at FROM rate_limits WHERE service = ?",
        )
        .bind(service)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        stored.map(from_millis).transpose()
    }

    async fn mark_request(&self, service: &str, at: OffsetDateTime) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO rate_limits (service, last_request_at) VALUES (?, ?) \
             ON CONFLICT (service) DO UPDATE SET last_request_at = excluded.last_request_at",
        )
        .bind(service)
        .bind(to_millis(at))
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn record_usage(
        &self,
        service: &str,
        day: Date,
        calls: u64,
        tokens: u64,
    ) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO api_usage (service, day, calls, tokens) VALUES (?, ?, ?, ?) \
             ON CONFLICT (service, day) DO UPDATE SET \
                calls = api_usage.calls + excluded.calls, \
                tokens = api_usage.tokens + excluded.tokens",
        )
        .bind(service)
        .bind(day_key(day))
        .bind(to_stored(calls)?)
        .bind(to_stored(tokens)?)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn usage_for_day(
        &self,
        service: &str,
        day: Date,
    ) -> Result<Option<UsageRecord>, RepoError> {
        let row = sqlx::query_as::<_, UsageRow>(
            "SELECT service, day, calls, tokens FROM api_usage WHERE service = ? AND day = ?",
        )
        .bind(service)
        .bind(day_key(day))
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(UsageRecord::try_from).transpose()
    }

    async fn prune_usage(&self, before: Date) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM api_usage WHERE day < ?")
            .bind(day_key(before))
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }
}
