//! SQLite artifact cache implementation.
//!
//! One row per (project, artifact key). Upserts use `ON CONFLICT` with
//! `COALESCE` so `None` fields keep the stored value.

use campflow_core::repository::artifact_cache::ArtifactCacheStore;
use campflow_types::cache::{ArtifactMetadata, CacheRecord, CacheUpdate};
use campflow_types::error::RepositoryError;
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, from_json, parse_datetime, query_error, to_json};

/// SQLite-backed implementation of `ArtifactCacheStore`.
pub struct SqliteArtifactCache {
    pool: DatabasePool,
}

impl SqliteArtifactCache {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<CacheRecord, RepositoryError> {
    let project_id: String = row.try_get("project_id").map_err(query_error)?;
    let metadata: Option<String> = row.try_get("metadata").map_err(query_error)?;
    let cached_result: Option<String> = row.try_get("cached_result").map_err(query_error)?;
    let last_computed_at: Option<String> = row.try_get("last_computed_at").map_err(query_error)?;
    let created_at: String = row.try_get("created_at").map_err(query_error)?;
    let updated_at: String = row.try_get("updated_at").map_err(query_error)?;

    Ok(CacheRecord {
        project_id: project_id
            .parse()
            .map_err(|e| RepositoryError::Query(format!("invalid project id: {e}")))?,
        artifact_key: row.try_get("artifact_key").map_err(query_error)?,
        original_filename: row.try_get("original_filename").map_err(query_error)?,
        artifact_type: row.try_get("artifact_type").map_err(query_error)?,
        metadata: metadata
            .as_deref()
            .map(|text| from_json::<ArtifactMetadata>("metadata", text))
            .transpose()?,
        cached_result: cached_result
            .as_deref()
            .map(|text| from_json("cached_result", text))
            .transpose()?,
        last_computed_at: last_computed_at.as_deref().map(parse_datetime).transpose()?,
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

impl ArtifactCacheStore for SqliteArtifactCache {
    async fn get_cache_record(
        &self,
        project_id: &Uuid,
        artifact_key: &str,
    ) -> Result<Option<CacheRecord>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM artifact_cache WHERE project_id = ? AND artifact_key = ?")
            .bind(project_id.to_string())
            .bind(artifact_key)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn upsert_cache_record(
        &self,
        project_id: &Uuid,
        artifact_key: &str,
        update: &CacheUpdate,
    ) -> Result<CacheRecord, RepositoryError> {
        let now = format_datetime(&Utc::now());
        let metadata = update.metadata.as_ref().map(to_json).transpose()?;
        let cached_result = update.cached_result.as_ref().map(to_json).transpose()?;
        let computed_at = cached_result.as_ref().map(|_| now.clone());

        let row = sqlx::query(
            "INSERT INTO artifact_cache (project_id, artifact_key, original_filename, artifact_type, metadata, cached_result, last_computed_at, created_at, updated_at)
             VALUES (?1, ?2, COALESCE(?3, ''), ?4, ?5, ?6, ?7, ?8, ?8)
             ON CONFLICT (project_id, artifact_key) DO UPDATE SET
                 original_filename = COALESCE(?3, original_filename),
                 artifact_type = COALESCE(?4, artifact_type),
                 metadata = COALESCE(?5, metadata),
                 cached_result = COALESCE(?6, cached_result),
                 last_computed_at = COALESCE(?7, last_computed_at),
                 updated_at = ?8
             RETURNING *",
        )
        .bind(project_id.to_string())
        .bind(artifact_key)
        .bind(&update.original_filename)
        .bind(&update.artifact_type)
        .bind(metadata)
        .bind(cached_result)
        .bind(computed_at)
        .bind(&now)
        .fetch_one(&self.pool.writer)
        .await
        .map_err(query_error)?;

        let record = record_from_row(&row)?;
        tracing::debug!(
            project_id = %project_id,
            artifact_key,
            has_result = record.has_result(),
            "artifact cache upserted"
        );
        Ok(record)
    }
}
