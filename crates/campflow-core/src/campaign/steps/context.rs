//! `load_context` and `analyze_files`: bring the project and this session's
//! artifacts into the state.

use std::sync::Arc;

use campflow_types::cache::CacheUpdate;
use campflow_types::workflow::{ArtifactAnalysis, UploadedArtifact, WorkflowState};
use futures_util::future::BoxFuture;
use serde_json::{Value, json};

use crate::campaign::services::CampaignServices;
use crate::campaign::{ANALYZE_FILES, LOAD_CONTEXT, USER_INPUTS};
use crate::repository::artifact_cache::ArtifactCacheStore;
use crate::repository::project::ProjectRepository;
use crate::workflow::step::{Step, StepError};

// ---------------------------------------------------------------------------
// load_context
// ---------------------------------------------------------------------------

/// Loads the project row and seeds user inputs from it.
///
/// When the session was prepared up front the state is already hydrated and
/// only the project's own fields are read here; the in-flight checkpoint is
/// never replaced.
pub struct LoadContextStep<P: ProjectRepository, C: ArtifactCacheStore> {
    services: Arc<CampaignServices<P, C>>,
}

impl<P: ProjectRepository, C: ArtifactCacheStore> LoadContextStep<P, C> {
    pub fn new(services: Arc<CampaignServices<P, C>>) -> Self {
        Self { services }
    }

    async fn execute(&self, state: &mut WorkflowState) -> Result<(), StepError> {
        let record = self
            .services
            .projects
            .load(&state.project_id)
            .await?
            .ok_or_else(|| StepError::Validation(format!("project {} not found", state.project_id)))?;

        if !state.project_loaded {
            let flow = state.flow.clone();
            state.hydrate(&record);
            state.flow = flow;
        }

        let inputs = state.payload_object(USER_INPUTS);
        if let Some(description) = &record.product_description {
            inputs
                .entry("product_description")
                .or_insert_with(|| json!(description));
        }
        if let Some(budget) = record.target_budget {
            inputs.entry("target_budget").or_insert_with(|| json!(budget));
        }

        if record.session_count == 0 {
            state.push_message(format!("New project: {}", record.name));
        } else {
            state.push_message(format!(
                "Loaded existing project: {} (phase {}, iteration {})",
                record.name, record.phase, record.iteration
            ));
        }
        tracing::debug!(
            project_id = %state.project_id,
            phase = %state.current_phase,
            iteration = state.iteration,
            "project context loaded"
        );
        Ok(())
    }
}

impl<P: ProjectRepository, C: ArtifactCacheStore> Step for LoadContextStep<P, C> {
    fn name(&self) -> &str {
        LOAD_CONTEXT
    }

    fn run<'a>(&'a self, state: &'a mut WorkflowState) -> BoxFuture<'a, Result<(), StepError>> {
        Box::pin(self.execute(state))
    }
}

// ---------------------------------------------------------------------------
// analyze_files
// ---------------------------------------------------------------------------

/// Produces one analysis per uploaded artifact, from cache where possible.
///
/// Misses are downloaded, analyzed and written back to the cache. A file that
/// cannot be downloaded or parsed is logged as an error and skipped.
pub struct AnalyzeFilesStep<P: ProjectRepository, C: ArtifactCacheStore> {
    services: Arc<CampaignServices<P, C>>,
}

impl<P: ProjectRepository, C: ArtifactCacheStore> AnalyzeFilesStep<P, C> {
    pub fn new(services: Arc<CampaignServices<P, C>>) -> Self {
        Self { services }
    }

    async fn execute(&self, state: &mut WorkflowState) -> Result<(), StepError> {
        let plan = self
            .services
            .cache
            .plan(state.project_id, &state.uploaded_files)
            .await?;

        let mut analyses = Vec::with_capacity(state.uploaded_files.len());
        for artifact in state.uploaded_files.clone() {
            if let Some(hit) = plan
                .hits
                .iter()
                .find(|h| h.artifact.storage_path == artifact.storage_path)
            {
                state.push_message(format!(
                    "Using cached analysis for {}",
                    artifact.original_filename
                ));
                analyses.push(hit.to_analysis());
                continue;
            }

            match self.analyze_miss(state, &artifact).await {
                Ok(analysis) => {
                    state.push_message(format!(
                        "Analyzed {}: {}, {} rows",
                        artifact.original_filename, analysis.artifact_type, analysis.row_count
                    ));
                    analyses.push(analysis);
                }
                Err(e) => {
                    tracing::warn!(
                        file = artifact.original_filename.as_str(),
                        error = %e,
                        "artifact analysis failed"
                    );
                    state.record_error(format!(
                        "File analysis error for {}: {e}",
                        artifact.original_filename
                    ));
                }
            }
        }

        state.file_analyses = analyses;
        Ok(())
    }

    async fn analyze_miss(
        &self,
        state: &WorkflowState,
        artifact: &UploadedArtifact,
    ) -> Result<ArtifactAnalysis, StepError> {
        let bytes = self.services.download(&artifact.storage_path).await?;
        let analyzed = self
            .services
            .analyzer
            .analyze(&artifact.original_filename, &bytes)?;

        self.services
            .cache
            .put(
                state.project_id,
                &artifact.storage_path,
                &CacheUpdate {
                    original_filename: Some(artifact.original_filename.clone()),
                    artifact_type: Some(analyzed.artifact_type.clone()),
                    metadata: Some(analyzed.metadata.clone()),
                    cached_result: None,
                },
            )
            .await?;

        Ok(ArtifactAnalysis {
            storage_path: artifact.storage_path.clone(),
            file_name: artifact.original_filename.clone(),
            artifact_type: analyzed.artifact_type,
            row_count: analyzed.metadata.row_count,
            columns: analyzed.metadata.columns,
            metrics: match analyzed.metadata.metrics {
                Value::Null => json!({}),
                metrics => metrics,
            },
            rows: analyzed.rows,
            cached: false,
            cached_result: None,
        })
    }
}

impl<P: ProjectRepository, C: ArtifactCacheStore> Step for AnalyzeFilesStep<P, C> {
    fn name(&self) -> &str {
        ANALYZE_FILES
    }

    fn run<'a>(&'a self, state: &'a mut WorkflowState) -> BoxFuture<'a, Result<(), StepError>> {
        Box::pin(self.execute(state))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
