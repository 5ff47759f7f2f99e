//! Hybrid artifact cache.
//!
//! Per-artifact analysis results are cached by (project id, artifact key) so a
//! re-uploaded artifact is never downloaded or analyzed twice. Aggregate
//! results are cached back onto every input artifact; a later session whose
//! inputs are all cached skips the aggregate computation entirely.

use std::sync::Arc;

use campflow_types::cache::{CacheRecord, CacheUpdate};
use campflow_types::error::RepositoryError;
use campflow_types::workflow::{ArtifactAnalysis, UploadedArtifact};
use serde_json::Value;
use uuid::Uuid;

use crate::repository::artifact_cache::ArtifactCacheStore;

// ---------------------------------------------------------------------------
// ArtifactCache
// ---------------------------------------------------------------------------

pub struct ArtifactCache<C: ArtifactCacheStore> {
    store: Arc<C>,
}

impl<C: ArtifactCacheStore> ArtifactCache<C> {
    pub fn new(store: Arc<C>) -> Self {
        Self { store }
    }

    pub async fn get(
        &self,
        project_id: Uuid,
        artifact_key: &str,
    ) -> Result<Option<CacheRecord>, RepositoryError> {
        self.store.get_cache_record(&project_id, artifact_key).await
    }

    pub async fn put(
        &self,
        project_id: Uuid,
        artifact_key: &str,
        update: &CacheUpdate,
    ) -> Result<CacheRecord, RepositoryError> {
        let record = self
            .store
            .upsert_cache_record(&project_id, artifact_key, update)
            .await?;
        tracing::debug!(project_id = %project_id, artifact_key, "cache record written");
        Ok(record)
    }

    /// Partition `artifacts` into analysis hits and misses.
    pub async fn plan(
        &self,
        project_id: Uuid,
        artifacts: &[UploadedArtifact],
    ) -> Result<CachePlan, RepositoryError> {
        let mut plan = CachePlan::default();
        for artifact in artifacts {
            match self.get(project_id, &artifact.storage_path).await? {
                Some(record) if record.is_analysis_hit() => plan.hits.push(CachedArtifact {
                    artifact: artifact.clone(),
                    record,
                }),
                _ => plan.misses.push(artifact.clone()),
            }
        }
        tracing::debug!(
            project_id = %project_id,
            hits = plan.hits.len(),
            misses = plan.misses.len(),
            "artifact cache plan"
        );
        Ok(plan)
    }

    /// Store `result` as the cached aggregate on every artifact.
    pub async fn store_result(
        &self,
        project_id: Uuid,
        artifacts: &[UploadedArtifact],
        result: &Value,
    ) -> Result<(), RepositoryError> {
        for artifact in artifacts {
            let update = CacheUpdate {
                original_filename: Some(artifact.original_filename.clone()),
                cached_result: Some(result.clone()),
                ..Default::default()
            };
            self.put(project_id, &artifact.storage_path, &update).await?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CachePlan
// ---------------------------------------------------------------------------

/// An input artifact served from cache.
#[derive(Debug, Clone)]
pub struct CachedArtifact {
    pub artifact: UploadedArtifact,
    pub record: CacheRecord,
}

impl CachedArtifact {
    /// Analysis rebuilt from the cached metadata. Raw rows are not cached.
    pub fn to_analysis(&self) -> ArtifactAnalysis {
        let metadata = self.record.metadata.clone().unwrap_or_default();
        ArtifactAnalysis {
            storage_path: self.artifact.storage_path.clone(),
            file_name: self.artifact.original_filename.clone(),
            artifact_type: self
                .record
                .artifact_type
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            row_count: metadata.row_count,
            columns: metadata.columns,
            metrics: metadata.metrics,
            rows: Vec::new(),
            cached: true,
            cached_result: self.record.cached_result.clone(),
        }
    }
}

/// Hits and misses for one step's inputs.
#[derive(Debug, Clone, Default)]
pub struct CachePlan {
    pub hits: Vec<CachedArtifact>,
    pub misses: Vec<UploadedArtifact>,
}

// ---------------------------------------------------------------------------
// AggregateMode
// ---------------------------------------------------------------------------

/// How an aggregate computation over several artifacts should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateMode {
    /// Every input has a cached result: synthesize, no computation.
    AllCached,
    /// Some inputs are new: compute, passing cached results as context.
    Hybrid,
    /// Nothing cached: compute from scratch.
    Fresh,
}

impl AggregateMode {
    pub fn classify(analyses: &[ArtifactAnalysis]) -> Self {
        let with_result = analyses
            .iter()
            .filter(|a| a.cached && a.cached_result.is_some())
            .count();
        match with_result {
            0 => AggregateMode::Fresh,
            n if n == analyses.len() => AggregateMode::AllCached,
            _ => AggregateMode::Hybrid,
        }
    }
}

/// Cached aggregate results carried by `analyses`, in input order.
pub fn cached_results(analyses: &[ArtifactAnalysis]) -> Vec<(&str, &Value)> {
    analyses
        .iter()
        .filter(|a| a.cached)
        .filter_map(|a| a.cached_result.as_ref().map(|r| (a.file_name.as_str(), r)))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryArtifactCache;
    use campflow_types::cache::ArtifactMetadata;
    use serde_json::json;

    fn artifact(name: &str) -> UploadedArtifact {
        UploadedArtifact {
            storage_path: format!("projects/p/{name}"),
            original_filename: name.to_string(),
        }
    }

    fn analysis(name: &str, cached: bool, result: Option<Value>) -> ArtifactAnalysis {
        ArtifactAnalysis {
            storage_path: format!("projects/p/{name}"),
            file_name: name.to_string(),
            artifact_type: "historical".into(),
            row_count: 0,
            columns: vec![],
            metrics: Value::Null,
            rows: vec![],
            cached,
            cached_result: result,
        }
    }

    #[tokio::test]
    async fn test_plan_partitions_hits_and_misses() {
        let store = Arc::new(MemoryArtifactCache::default());
        let cache = ArtifactCache::new(Arc::clone(&store));
        let project = Uuid::now_v7();

        cache
            .put(
                project,
                "projects/p/a.csv",
                &CacheUpdate {
                    original_filename: Some("a.csv".into()),
                    artifact_type: Some("historical".into()),
                    metadata: Some(ArtifactMetadata {
                        row_count: 10,
                        ..Default::default()
                    }),
                    cached_result: None,
                },
            )
            .await
            .unwrap();
        // Type without metadata is not a hit.
        cache
            .put(
                project,
                "projects/p/b.csv",
                &CacheUpdate {
                    artifact_type: Some("historical".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let plan = cache
            .plan(project, &[artifact("a.csv"), artifact("b.csv"), artifact("c.csv")])
            .await
            .unwrap();
        assert_eq!(plan.hits.len(), 1);
        assert_eq!(plan.hits[0].artifact.original_filename, "a.csv");
        assert_eq!(plan.misses.len(), 2);

        let rebuilt = plan.hits[0].to_analysis();
        assert!(rebuilt.cached);
        assert_eq!(rebuilt.row_count, 10);
        assert!(rebuilt.rows.is_empty());
    }

    #[tokio::test]
    async fn test_store_result_keeps_metadata() {
        let store = Arc::new(MemoryArtifactCache::default());
        let cache = ArtifactCache::new(Arc::clone(&store));
        let project = Uuid::now_v7();
        let a = artifact("a.csv");

        cache
            .put(
                project,
                &a.storage_path,
                &CacheUpdate {
                    artifact_type: Some("historical".into()),
                    metadata: Some(ArtifactMetadata::default()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        cache
            .store_result(project, &[a.clone()], &json!({"strategy": {}}))
            .await
            .unwrap();

        let record = cache.get(project, &a.storage_path).await.unwrap().unwrap();
        assert!(record.is_analysis_hit());
        assert!(record.has_result());
        assert!(record.last_computed_at.is_some());
    }

    #[test]
    fn test_aggregate_mode_classification() {
        let r = Some(json!({"strategy": {}}));
        assert_eq!(AggregateMode::classify(&[]), AggregateMode::Fresh);
        assert_eq!(
            AggregateMode::classify(&[analysis("a", true, r.clone()), analysis("b", true, r.clone())]),
            AggregateMode::AllCached
        );
        assert_eq!(
            AggregateMode::classify(&[analysis("a", true, r.clone()), analysis("b", false, None)]),
            AggregateMode::Hybrid
        );
        // A cached analysis without an aggregate result still needs computing.
        assert_eq!(
            AggregateMode::classify(&[analysis("a", true, None)]),
            AggregateMode::Fresh
        );
    }

    #[test]
    fn test_cached_results_in_input_order() {
        let analyses = [
            analysis("b", true, Some(json!(2))),
            analysis("new", false, None),
            analysis("a", true, Some(json!(1))),
        ];
        let results = cached_results(&analyses);
        assert_eq!(results, vec![("b", &json!(2)), ("a", &json!(1))]);
    }
}
