use std::path::PathBuf;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{CacheRepo, RepoError},
    domain::entities::{CacheDomainCounts, CacheEntry, NewCacheEntry},
    domain::types::CacheDomain,
};

use super::{
    SqliteRepositories, map_sqlx_error,
    util::{from_millis, to_count, to_millis},
};

const ENTRY_COLUMNS: &str = "fingerprint, input_summary, payload, backing_file, hit_count, \
    last_hit_at, created_at, expires_at, valid";

#[derive(sqlx::FromRow)]
struct CacheRow {
    fingerprint: String,
    input_summary: String,
    payload: String,
    backing_file: Option<String>,
    hit_count: i64,
    last_hit_at: Option<i64>,
    created_at: i64,
    expires_at: i64,
    valid: bool,
}

impl CacheRow {
    fn into_entry(self, domain: CacheDomain) -> Result<CacheEntry, RepoError> {
        Ok(CacheEntry {
            domain,
            fingerprint: self.fingerprint,
            input_summary: self.input_summary,
            payload: self.payload,
            backing_file: self.backing_file.map(PathBuf::from),
            hit_count: to_count(self.hit_count)?,
            last_hit_at: self.last_hit_at.map(from_millis).transpose()?,
            created_at: from_millis(self.created_at)?,
            expires_at: from_millis(self.expires_at)?,
            valid: self.valid,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CountsRow {
    entries: i64,
    entries_with_hits: i64,
    payload_bytes: i64,
}

#[async_trait]
impl CacheRepo for SqliteRepositories {
    async fn find_entry(
        &self,
        domain: CacheDomain,
        fingerprint: &str,
    ) -> Result<Option<CacheEntry>, RepoError> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM {} WHERE fingerprint = ?",
            domain.table()
        );
        let row = sqlx::query_as::<_, CacheRow>(&sql)
            .bind(fingerprint)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.map(|row| row.into_entry(domain)).transpose()
    }

    async fn upsert_entry(&self, entry: NewCacheEntry) -> Result<(), RepoError> {
        let sql = format!(
            "INSERT INTO {table} ({ENTRY_COLUMNS}) \
             VALUES (?, ?, ?, ?, 0, NULL, ?, ?, 1) \
             ON CONFLICT (fingerprint) DO UPDATE SET \
                input_summary = excluded.input_summary, \
                payload = excluded.payload, \
                backing_file = excluded.backing_file, \
                hit_count = 0, \
                last_hit_at = NULL, \
                created_at = excluded.created_at, \
                expires_at = excluded.expires_at, \
                valid = 1",
            table = entry.domain.table()
        );
        let backing_file = entry
            .backing_file
            .as_ref()
            .map(|path| path.to_string_lossy().into_owned());

        sqlx::query(&sql)
            .bind(&entry.fingerprint)
            .bind(&entry.input_summary)
            .bind(&entry.payload)
            .bind(backing_file)
            .bind(to_millis(entry.created_at))
            .bind(to_millis(entry.expires_at))
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn record_hit(
        &self,
        domain: CacheDomain,
        fingerprint: &str,
        at: OffsetDateTime,
    ) -> Result<Option<CacheEntry>, RepoError> {
        let sql = format!(
            "UPDATE {} SET hit_count = hit_count + 1, last_hit_at = ? \
             WHERE fingerprint = ? AND valid = 1 AND expires_at > ? \
             RETURNING {ENTRY_COLUMNS}",
            domain.table()
        );
        let millis = to_millis(at);
        let row = sqlx::query_as::<_, CacheRow>(&sql)
            .bind(millis)
            .bind(fingerprint)
            .bind(millis)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.map(|row| row.into_entry(domain)).transpose()
    }

    async fn invalidate_entry(
        &self,
        domain: CacheDomain,
        fingerprint: &str,
    ) -> Result<bool, RepoError> {
        let sql = format!(
            "UPDATE {} SET valid = 0 WHERE fingerprint = ?",
            domain.table()
        );
        let result = sqlx::query(&sql)
            .bind(fingerprint)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_entry(
        &self,
        domain: CacheDomain,
        fingerprint: &str,
    ) -> Result<bool, RepoError> {
        let sql = format!("DELETE FROM {} WHERE fingerprint = ?", domain.table());
        let result = sqlx::query(&sql)
            .bind(fingerprint)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_expired(
        &self,
        domain: CacheDomain,
        now: OffsetDateTime,
    ) -> Result<Vec<CacheEntry>, RepoError> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM {} WHERE expires_at <= ? ORDER BY expires_at ASC",
            domain.table()
        );
        let rows = sqlx::query_as::<_, CacheRow>(&sql)
            .bind(to_millis(now))
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        rows.into_iter().map(|row| row.into_entry(domain)).collect()
    }

    async fn list_backing_files(&self, domain: CacheDomain) -> Result<Vec<String>, RepoError> {
        let sql = format!(
            "SELECT backing_file FROM {} WHERE backing_file IS NOT NULL",
            domain.table()
        );
        sqlx::query_scalar::<_, String>(&sql)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)
    }

    async fn domain_counts(&self, domain: CacheDomain) -> Result<CacheDomainCounts, RepoError> {
        let sql = format!(
            "SELECT COUNT(*) AS entries, \
                    COALESCE(SUM(CASE WHEN hit_count > 0 THEN 1 ELSE 0 END), 0) AS entries_with_hits, \
                    COALESCE(SUM(LENGTH(CAST(payload AS BLOB))), 0) AS payload_bytes \
             FROM {}",
            domain.table()
        );
        let row = sqlx::query_as::<_, CountsRow>(&sql)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(CacheDomainCounts {
            entries: to_count(row.entries)?,
            entries_with_hits: to_count(row.entries_with_hits)?,
            payload_bytes: to_count(row.payload_bytes)?,
        })
    }

    async fn clear_domain(&self, domain: CacheDomain) -> Result<u64, RepoError> {
        let sql = format!("DELETE FROM {}", domain.table());
        let result = sqlx::query(&sql)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }
}
