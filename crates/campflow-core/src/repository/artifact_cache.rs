//! Artifact cache store trait definition.

use campflow_types::cache::{CacheRecord, CacheUpdate};
use campflow_types::error::RepositoryError;
use uuid::Uuid;

/// Storage for per-artifact analysis and aggregate results.
///
/// Keyed by (project id, artifact key). Upserts refresh an existing record in
/// place; `None` fields in the update leave stored values untouched.
pub trait ArtifactCacheStore: Send + Sync {
    fn get_cache_record(
        &self,
        project_id: &Uuid,
        artifact_key: &str,
    ) -> impl std::future::Future<Output = Result<Option<CacheRecord>, RepositoryError>> + Send;

    fn upsert_cache_record(
        &self,
        project_id: &Uuid,
        artifact_key: &str,
        update: &CacheUpdate,
    ) -> impl std::future::Future<Output = Result<CacheRecord, RepositoryError>> + Send;
}
