//! Checkpoint tracker: durable progress bookkeeping around every step.
//!
//! Before a step runs its name is recorded as executing and the flow marked
//! in progress. On success the step is appended to `completed_steps` and the
//! whole state is autosaved; on failure the flow is marked failed, the error
//! logged into the state, and a best-effort save made before the original
//! error is returned. A cycle row is written for every tracked step.

use std::sync::Arc;
use std::time::Instant;

use campflow_types::error::RepositoryError;
use campflow_types::project::{SchemaCapabilities, StepCycle};
use campflow_types::workflow::WorkflowState;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::repository::project::ProjectRepository;
use crate::repository::session::SessionRepository;

use super::progress::{LogLevel, ProgressReporter, StepSummary};
use super::step::{Step, StepError};

// ---------------------------------------------------------------------------
// CheckpointTracker
// ---------------------------------------------------------------------------

/// Persists the flow checkpoint around step execution.
///
/// Generic over the project and session stores so it works with any storage
/// backend (SQLite, in-memory mock, etc.).
pub struct CheckpointTracker<P: ProjectRepository, S: SessionRepository> {
    projects: Arc<P>,
    sessions: Arc<S>,
    reporter: Arc<dyn ProgressReporter>,
    /// Negotiated once on first save.
    capabilities: Mutex<Option<SchemaCapabilities>>,
}

impl<P: ProjectRepository, S: SessionRepository> CheckpointTracker<P, S> {
    pub fn new(projects: Arc<P>, sessions: Arc<S>, reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            projects,
            sessions,
            reporter,
            capabilities: Mutex::new(None),
        }
    }

    pub fn reporter(&self) -> &Arc<dyn ProgressReporter> {
        &self.reporter
    }

    /// Wrap `step` so that invoking it runs reporter -> checkpoint -> step.
    pub fn track<'t>(&'t self, step: &'t dyn Step, terminal: bool) -> TrackedStep<'t, P, S> {
        TrackedStep {
            tracker: self,
            step,
            terminal,
        }
    }

    /// Capabilities negotiated so far, if any save happened.
    pub async fn capabilities(&self) -> Option<SchemaCapabilities> {
        self.capabilities.lock().await.clone()
    }

    /// Save a snapshot of `state`, omitting optional fields the store lacks.
    ///
    /// If the store still rejects a field as unknown, that capability is
    /// dropped and the save retried exactly once without it.
    pub async fn save(&self, state: &WorkflowState) -> Result<(), RepositoryError> {
        let mut guard = self.capabilities.lock().await;
        if guard.is_none() {
            let negotiated = self.projects.schema_capabilities().await?;
            let missing = negotiated.missing();
            if !missing.is_empty() {
                tracing::warn!(
                    columns = ?missing,
                    "store lacks optional columns, saving without them"
                );
            }
            *guard = Some(negotiated);
        }
        let capabilities = guard.get_or_insert_with(SchemaCapabilities::default);

        let snapshot = state.snapshot().restricted_to(capabilities);
        let result = self.projects.save(&snapshot).await;
        match result {
            Err(RepositoryError::UnknownColumn(field)) => {
                tracing::warn!(
                    project_id = %state.project_id,
                    column = field.as_str(),
                    "store rejected column, retrying save without it"
                );
                capabilities.drop_column(&field);
                self.projects.save(&snapshot.without_field(&field)).await
            }
            other => other,
        }
    }

    async fn log_cycle(
        &self,
        state: &WorkflowState,
        step: &str,
        started: Instant,
        error: Option<String>,
    ) {
        let Some(session_id) = state.session_id else {
            return;
        };
        let cycle = StepCycle {
            id: Uuid::now_v7(),
            session_id,
            project_id: state.project_id,
            step_name: step.to_string(),
            cycle_num: state.cycle_num,
            execution_time_ms: started.elapsed().as_millis() as u64,
            success: error.is_none(),
            error,
            created_at: Utc::now(),
        };
        if let Err(e) = self.sessions.log_cycle(&cycle).await {
            tracing::warn!(step, error = %e, "failed to log step cycle");
        }
    }
}

// ---------------------------------------------------------------------------
// TrackedStep
// ---------------------------------------------------------------------------

/// A step composed with checkpointing and progress reporting.
pub struct TrackedStep<'t, P: ProjectRepository, S: SessionRepository> {
    tracker: &'t CheckpointTracker<P, S>,
    step: &'t dyn Step,
    terminal: bool,
}

impl<P: ProjectRepository, S: SessionRepository> TrackedStep<'_, P, S> {
    pub async fn invoke(self, state: &mut WorkflowState) -> Result<(), StepError> {
        let name = self.step.name();
        let tracker = self.tracker;
        tracker.reporter.step_start(name);
        let started = Instant::now();

        state.flow.begin_step(name)?;
        tracing::debug!(project_id = %state.project_id, step = name, "checkpointed step start");

        let result = self.step.run(state).await;
        state.bump_cycle();

        match result {
            Ok(()) => {
                state.flow.complete_step(name, self.terminal)?;
                if let Err(e) = tracker.save(state).await {
                    tracing::warn!(step = name, error = %e, "autosave failed");
                    tracker
                        .reporter
                        .log(&format!("Autosave after {name} failed: {e}"), LogLevel::Warn);
                } else {
                    tracing::debug!(step = name, "checkpointed step complete");
                }
                tracker.log_cycle(state, name, started, None).await;
                tracker.reporter.step_end(
                    name,
                    &StepSummary {
                        success: true,
                        cycle_num: state.cycle_num,
                        duration: started.elapsed(),
                        message: state.messages.last().cloned(),
                        error: None,
                    },
                );
                Ok(())
            }
            Err(error) => {
                if let Err(e) = state.flow.fail_step() {
                    tracing::error!(step = name, error = %e, "could not mark flow failed");
                }
                let message = format!("{name} failed: {error}");
                state.record_error(message.clone());
                if let Err(e) = tracker.save(state).await {
                    tracing::warn!(step = name, error = %e, "best-effort save after failure failed");
                }
                tracker
                    .log_cycle(state, name, started, Some(error.to_string()))
                    .await;
                tracker.reporter.step_end(
                    name,
                    &StepSummary {
                        success: false,
                        cycle_num: state.cycle_num,
                        duration: started.elapsed(),
                        message: None,
                        error: Some(message),
                    },
                );
                Err(error)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
