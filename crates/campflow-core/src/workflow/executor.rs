//! Workflow executor: sequential step-graph traversal with durable checkpointing.
//!
//! The `Scheduler` walks a validated [`WorkflowGraph`] one step at a time. Each
//! step runs through the [`CheckpointTracker`]; router steps choose their
//! successor through a conditional edge. A resumed flow starts wherever the
//! resumption resolver points instead of at the entry step.
//!
//! # Execution flow
//!
//! 1. Pick the start step: entry, or `resolve(last_completed)` when resuming.
//! 2. Run the step through the tracker (checkpoint, autosave, cycle log).
//! 3. Follow the fixed edge, or the conditional edge for routers.
//! 4. Stop after the terminal step; the flow is then `completed`.

use std::sync::Arc;

use campflow_types::workflow::{FlowStatus, WorkflowState};

use crate::repository::project::ProjectRepository;
use crate::repository::session::SessionRepository;

use super::checkpoint::CheckpointTracker;
use super::graph::{GraphError, WorkflowGraph};
use super::resume::{Resolution, resolve};
use super::step::StepError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default bound on steps executed in one run.
pub const DEFAULT_MAX_STEPS: usize = 64;

// ---------------------------------------------------------------------------
// RunSummary
// ---------------------------------------------------------------------------

/// What one `run` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Steps executed in this run, in order.
    pub executed: Vec<String>,
    /// Step the run resumed at, when it continued an interrupted flow.
    pub resumed_at: Option<String>,
    pub status: FlowStatus,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Drives one flow instance through the graph.
pub struct Scheduler<P: ProjectRepository, S: SessionRepository> {
    graph: Arc<WorkflowGraph>,
    tracker: Arc<CheckpointTracker<P, S>>,
    max_steps: usize,
}

impl<P: ProjectRepository, S: SessionRepository> Scheduler<P, S> {
    pub fn new(graph: Arc<WorkflowGraph>, tracker: Arc<CheckpointTracker<P, S>>) -> Self {
        Self {
            graph,
            tracker,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    /// Execute the flow in `state` until the terminal step or the first failure.
    ///
    /// On failure the tracker has already persisted the failed checkpoint, so
    /// the next invocation can resume from the last completed step.
    pub async fn run(&self, state: &mut WorkflowState) -> Result<RunSummary, ExecutorError> {
        let mut summary = RunSummary {
            executed: Vec::new(),
            resumed_at: None,
            status: state.flow.flow_status,
        };

        let resume_from = if state.flow.is_resuming {
            state.flow.last_completed_step.clone()
        } else {
            None
        };

        let mut current = match resume_from {
            Some(last) => match resolve(&self.graph, Some(&last), state) {
                Resolution::Done => {
                    tracing::info!(
                        project_id = %state.project_id,
                        last_completed = last.as_str(),
                        "flow already complete, nothing to resume"
                    );
                    return Ok(summary);
                }
                Resolution::Next(next) => {
                    tracing::info!(
                        project_id = %state.project_id,
                        last_completed = last.as_str(),
                        resume_at = next.as_str(),
                        "resuming flow"
                    );
                    summary.resumed_at = Some(next.clone());
                    next
                }
            },
            None => self.graph.entry().to_string(),
        };

        for _ in 0..self.max_steps {
            let step = self
                .graph
                .step(&current)
                .ok_or_else(|| GraphError::UnknownStep(current.clone()))?;
            let terminal = self.graph.is_terminal(&current);

            self.tracker
                .track(step.as_ref(), terminal)
                .invoke(state)
                .await
                .map_err(|source| ExecutorError::StepExecution {
                    step: current.clone(),
                    source,
                })?;
            summary.executed.push(current.clone());

            match self.graph.next_after(&current, state)? {
                Some(next) => current = next,
                None => {
                    summary.status = state.flow.flow_status;
                    tracing::info!(
                        project_id = %state.project_id,
                        steps = summary.executed.len(),
                        "flow completed"
                    );
                    return Ok(summary);
                }
            }
        }

        tracing::error!(
            project_id = %state.project_id,
            max_steps = self.max_steps,
            "step budget exceeded"
        );
        Err(ExecutorError::StepBudgetExceeded(self.max_steps))
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur during flow execution.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// Graph traversal failed (unknown step, unmapped router label).
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    /// A step failed; its failure is already checkpointed.
    #[error("step '{step}' failed: {source}")]
    StepExecution {
        step: String,
        #[source]
        source: StepError,
    },

    /// The traversal ran more steps than allowed.
    #[error("step budget of {0} exceeded")]
    StepBudgetExceeded(usize),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::testing::{MemoryProjectRepository, MemorySessionRepository};
    use crate::workflow::graph::Selector;
    use crate::workflow::progress::{NoopReporter, ProgressReporter};
    use crate::workflow::step::Step;
    use campflow_types::project::NewProject;
    use futures_util::future::BoxFuture;

    /// Appends its name to a shared log; optionally fails on its first runs.
    struct Recorder {
        name: String,
        log: Arc<Mutex<Vec<String>>>,
        failures_left: Mutex<u32>,
    }

    impl Step for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        fn run<'a>(&'a self, state: &'a mut WorkflowState) -> BoxFuture<'a, Result<(), StepError>> {
            Box::pin(async move {
                let mut failures = self.failures_left.lock().unwrap();
                if *failures > 0 {
                    *failures -= 1;
                    return Err(StepError::Validation(format!("{} exploded", self.name)));
                }
                self.log.lock().unwrap().push(self.name.clone());
                if self.name == "router" {
                    state.set_payload("route", "b".into());
                }
                Ok(())
            })
        }
    }

    struct Fixture {
        log: Arc<Mutex<Vec<String>>>,
        projects: Arc<MemoryProjectRepository>,
        scheduler: Scheduler<MemoryProjectRepository, MemorySessionRepository>,
    }

    fn fixture(failing: &[(&str, u32)]) -> Fixture {
        let log = Arc::new(Mutex::new(Vec::new()));
        let step = |name: &str| -> Arc<dyn Step> {
            let failures = failing
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, count)| *count)
                .unwrap_or(0);
            Arc::new(Recorder {
                name: name.to_string(),
                log: Arc::clone(&log),
                failures_left: Mutex::new(failures),
            })
        };
        let selector: Selector = Arc::new(|state: &WorkflowState| {
            state
                .payload_value("route")
                .and_then(|v| v.as_str())
                .unwrap_or("a")
                .to_string()
        });
        let graph = WorkflowGraph::builder()
            .step(step("load"))
            .step(step("analyze"))
            .step(step("router"))
            .step(step("a"))
            .step(step("b"))
            .step(step("b2"))
            .step(step("save"))
            .entry("load")
            .reentry("router")
            .edge("load", "analyze")
            .edge("analyze", "router")
            .conditional("router", selector, [("a", "a"), ("b", "b")])
            .edge("a", "save")
            .edge("b", "b2")
            .edge("b2", "save")
            .build()
            .unwrap();

        let projects = Arc::new(MemoryProjectRepository::new());
        let tracker = Arc::new(CheckpointTracker::new(
            Arc::clone(&projects),
            Arc::new(MemorySessionRepository::default()),
            Arc::new(NoopReporter) as Arc<dyn ProgressReporter>,
        ));
        Fixture {
            log,
            projects: Arc::clone(&projects),
            scheduler: Scheduler::new(Arc::new(graph), tracker),
        }
    }

    async fn new_state(projects: &MemoryProjectRepository) -> WorkflowState {
        let record = projects
            .create(&NewProject {
                name: "flow".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        WorkflowState::new(record.id, vec![])
    }

    fn taken(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        std::mem::take(&mut *log.lock().unwrap())
    }

    #[tokio::test]
    async fn test_full_run_follows_conditional_edge() {
        let f = fixture(&[]);
        let mut state = new_state(&f.projects).await;

        let summary = f.scheduler.run(&mut state).await.unwrap();

        assert_eq!(summary.executed, vec!["load", "analyze", "router", "b", "b2", "save"]);
        assert_eq!(summary.status, FlowStatus::Completed);
        assert!(summary.resumed_at.is_none());
        assert_eq!(state.flow.completed_steps, summary.executed);
        assert_eq!(state.cycle_num, 6);
    }

    #[tokio::test]
    async fn test_failure_then_resume_matches_uninterrupted_run() {
        let f = fixture(&[("b2", 1)]);
        let mut state = new_state(&f.projects).await;

        let err = f.scheduler.run(&mut state).await.unwrap_err();
        assert!(matches!(err, ExecutorError::StepExecution { ref step, .. } if step == "b2"));
        assert_eq!(taken(&f.log), vec!["load", "analyze", "router", "b"]);

        let stored = f.projects.load(&state.project_id).await.unwrap().unwrap();
        assert_eq!(stored.checkpoint.flow_status, FlowStatus::Failed);
        assert_eq!(stored.checkpoint.last_completed_step.as_deref(), Some("b"));

        // A fresh process rehydrates and resumes.
        let mut resumed = WorkflowState::new(state.project_id, vec![]);
        resumed.hydrate(&stored);
        resumed.flow.is_resuming = true;
        let summary = f.scheduler.run(&mut resumed).await.unwrap();

        assert_eq!(summary.resumed_at.as_deref(), Some("b2"));
        assert_eq!(taken(&f.log), vec!["b2", "save"]);
        assert_eq!(resumed.flow.flow_status, FlowStatus::Completed);
        assert_eq!(
            resumed.flow.completed_steps,
            vec!["load", "analyze", "router", "b", "b2", "save"]
        );
    }

    #[tokio::test]
    async fn test_resume_after_router_does_not_rerun_router() {
        let f = fixture(&[]);
        let mut state = new_state(&f.projects).await;
        state.set_payload("route", "a".into());
        state.flow.completed_steps = vec!["load".into(), "analyze".into(), "router".into()];
        state.flow.last_completed_step = Some("router".into());
        state.flow.flow_status = FlowStatus::Failed;
        state.flow.is_resuming = true;

        let summary = f.scheduler.run(&mut state).await.unwrap();
        assert_eq!(summary.executed, vec!["a", "save"]);
        assert_eq!(taken(&f.log), vec!["a", "save"]);
    }

    #[tokio::test]
    async fn test_resume_flag_without_checkpoint_starts_at_entry() {
        let f = fixture(&[]);
        let mut state = new_state(&f.projects).await;
        state.flow.is_resuming = true;

        let summary = f.scheduler.run(&mut state).await.unwrap();
        assert_eq!(summary.executed.first().map(String::as_str), Some("load"));
    }

    #[tokio::test]
    async fn test_resume_after_terminal_is_noop() {
        let f = fixture(&[]);
        let mut state = new_state(&f.projects).await;
        state.flow.last_completed_step = Some("save".into());
        state.flow.is_resuming = true;

        let summary = f.scheduler.run(&mut state).await.unwrap();
        assert!(summary.executed.is_empty());
        assert!(taken(&f.log).is_empty());
    }

    #[tokio::test]
    async fn test_step_budget() {
        let f = fixture(&[]);
        let scheduler = Scheduler::new(Arc::clone(&f.scheduler.graph), Arc::clone(&f.scheduler.tracker))
            .with_max_steps(3);
        let mut state = new_state(&f.projects).await;

        let err = scheduler.run(&mut state).await.unwrap_err();
        assert!(matches!(err, ExecutorError::StepBudgetExceeded(3)));
        assert_eq!(state.flow.completed_steps.len(), 3);
    }
}
