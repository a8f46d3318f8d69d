use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{HistoryRepo, RepoError},
    domain::entities::ProducedItemRecord,
    domain::types::RoutingMode,
};

use super::{
    SqliteRepositories, map_sqlx_error,
    util::{from_millis, to_millis},
};

#[derive(sqlx::FromRow)]
struct ProducedRow {
    id: String,
    source_hash: String,
    content_hash: String,
    content_snippet: String,
    locator: String,
    title: String,
    source_name: String,
    routed_locator: String,
    routing_mode: String,
    quality_score: f64,
    originality_score: f64,
    produced_at: i64,
}

impl TryFrom<ProducedRow> for ProducedItemRecord {
    type Error = RepoError;

    fn try_from(row: ProducedRow) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&row.id).map_err(|err| RepoError::Integrity {
            message: format!("stored id `{}` is not a uuid: {err}", row.id),
        })?;
        let routing_mode = match row.routing_mode.as_str() {
            "publish" => RoutingMode::Publish,
            "review" => RoutingMode::Review,
            other => {
                return Err(RepoError::Integrity {
                    message: format!("unknown routing mode `{other}`"),
                });
            }
        };

        Ok(Self {
            id,
            source_hash: row.source_hash,
            content_hash: row.content_hash,
            content_snippet: row.content_snippet,
            locator: row.locator,
            title: row.title,
            source_name: row.source_name,
            routed_locator: row.routed_locator,
            routing_mode,
            quality_score: row.quality_score,
            originality_score: row.originality_score,
            produced_at: from_millis(row.produced_at)?,
        })
    }
}

#[async_trait]
impl HistoryRepo for SqliteRepositories {
    async fn source_exists(&self, source_hash: &str) -> Result<bool, RepoError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM produced_items WHERE source_hash = ?)",
        )
        .bind(source_hash)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn content_exists(&self, content_hash: &str) -> Result<bool, RepoError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM produced_items WHERE content_hash = ?)",
        )
        .bind(content_hash)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn insert_produced(&self, record: ProducedItemRecord) -> Result<bool, RepoError> {
        let result = sqlx::query(
            "INSERT INTO produced_items (id, source_hash, content_hash, content_snippet, locator, \
                title, source_name, routed_locator, routing_mode, quality_score, \
                originality_score, produced_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (source_hash) DO NOTHING",
        )
        .bind(record.id.to_string())
        .bind(&record.source_hash)
        .bind(&record.content_hash)
        .bind(&record.content_snippet)
        .bind(&record.locator)
        .bind(&record.title)
        .bind(&record.source_name)
        .bind(&record.routed_locator)
        .bind(record.routing_mode.as_str())
        .bind(record.quality_score)
        .bind(record.originality_score)
        .bind(to_millis(record.produced_at))
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn recent_produced(
        &self,
        since: OffsetDateTime,
        limit: usize,
    ) -> Result<Vec<ProducedItemRecord>, RepoError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, ProducedRow>(
            "SELECT id, source_hash, content_hash, content_snippet, locator, title, source_name, \
                routed_locator, routing_mode, quality_score, originality_score, produced_at \
             FROM produced_items \
             WHERE produced_at >= ? \
             ORDER BY produced_at DESC \
             LIMIT ?",
        )
        .bind(to_millis(since))
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(ProducedItemRecord::try_from).collect()
    }

    async fn prune_produced(&self, before: OffsetDateTime) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM produced_items WHERE produced_at < ?")
            .bind(to_millis(before))
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }
}
