//! Workflow state types for Campflow.
//!
//! `WorkflowState` is the single mutable context threaded through every step
//! of a session. Its `flow` field is the checkpoint: which steps completed,
//! which one is executing, and the overall flow status. Everything the engine
//! does not interpret lives in the extensible `payload` map.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Payload key holding the serialized [`RouterDecision`].
pub const ROUTER_DECISION: &str = "router_decision";

// ---------------------------------------------------------------------------
// FlowStatus
// ---------------------------------------------------------------------------

/// Overall status of one flow through the step graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Failed,
}

impl FlowStatus {
    /// Whether `self -> next` is a legal transition outside of an explicit restart.
    ///
    /// `InProgress -> InProgress` is allowed so consecutive steps can each mark
    /// the flow as running.
    pub fn can_transition_to(self, next: FlowStatus) -> bool {
        matches!(
            (self, next),
            (FlowStatus::NotStarted, FlowStatus::InProgress)
                | (FlowStatus::InProgress, FlowStatus::InProgress)
                | (FlowStatus::InProgress, FlowStatus::Completed)
                | (FlowStatus::InProgress, FlowStatus::Failed)
                | (FlowStatus::Failed, FlowStatus::InProgress)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FlowStatus::NotStarted => "not_started",
            FlowStatus::InProgress => "in_progress",
            FlowStatus::Completed => "completed",
            FlowStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(FlowStatus::NotStarted),
            "in_progress" => Ok(FlowStatus::InProgress),
            "completed" => Ok(FlowStatus::Completed),
            "failed" => Ok(FlowStatus::Failed),
            other => Err(format!("invalid flow status: '{other}'")),
        }
    }
}

/// Rejected flow status change.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("illegal flow status transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: FlowStatus,
    pub to: FlowStatus,
}

// ---------------------------------------------------------------------------
// FlowCheckpoint
// ---------------------------------------------------------------------------

/// Flow-tracking fields persisted with every autosave.
///
/// Invariants maintained by the mutators below:
/// - `completed_steps` never contains duplicates.
/// - `last_completed_step` is `None` or equal to the last element of
///   `completed_steps`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowCheckpoint {
    #[serde(default)]
    pub last_completed_step: Option<String>,
    #[serde(default)]
    pub completed_steps: Vec<String>,
    #[serde(default)]
    pub flow_status: FlowStatus,
    #[serde(default)]
    pub current_executing_step: Option<String>,
    #[serde(default)]
    pub is_resuming: bool,
    #[serde(default)]
    pub force_restart: bool,
}

impl FlowCheckpoint {
    /// Move to `next`, rejecting transitions outside the allowed set.
    pub fn transition(&mut self, next: FlowStatus) -> Result<(), TransitionError> {
        if !self.flow_status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.flow_status,
                to: next,
            });
        }
        self.flow_status = next;
        Ok(())
    }

    /// Mark `step` as executing and the flow as in progress.
    pub fn begin_step(&mut self, step: &str) -> Result<(), TransitionError> {
        self.transition(FlowStatus::InProgress)?;
        self.current_executing_step = Some(step.to_string());
        Ok(())
    }

    /// Record a successful step. Appending is idempotent.
    pub fn complete_step(&mut self, step: &str, terminal: bool) -> Result<(), TransitionError> {
        if terminal {
            self.transition(FlowStatus::Completed)?;
        }
        if let Some(pos) = self.completed_steps.iter().position(|s| s == step) {
            // Re-completing an earlier step keeps the last element in sync
            // with `last_completed_step`.
            let existing = self.completed_steps.remove(pos);
            self.completed_steps.push(existing);
        } else {
            self.completed_steps.push(step.to_string());
        }
        self.last_completed_step = Some(step.to_string());
        self.current_executing_step = None;
        Ok(())
    }

    /// Record a failed step. Completed steps are left untouched.
    pub fn fail_step(&mut self) -> Result<(), TransitionError> {
        self.transition(FlowStatus::Failed)?;
        self.current_executing_step = None;
        Ok(())
    }

    /// Explicit restart: the only path back to `NotStarted` from any status.
    pub fn reset(&mut self) {
        self.flow_status = FlowStatus::NotStarted;
        self.last_completed_step = None;
        self.completed_steps.clear();
        self.current_executing_step = None;
        self.is_resuming = false;
    }

    pub fn is_completed(&self, step: &str) -> bool {
        self.completed_steps.iter().any(|s| s == step)
    }

    /// An interrupted (in-progress or failed) flow with at least one completed step.
    pub fn can_resume(&self) -> bool {
        matches!(
            self.flow_status,
            FlowStatus::InProgress | FlowStatus::Failed
        ) && self.last_completed_step.is_some()
    }
}

// ---------------------------------------------------------------------------
// Router decision and project phase
// ---------------------------------------------------------------------------

/// Classification produced by the router step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// No project strategy yet: collect context, build strategy, set up campaign.
    Initialize,
    /// Experiment results uploaded: analyze performance and adjust.
    Reflect,
    /// Additional context uploaded: fold it into the strategy.
    Enrich,
    /// Continue from the project's current phase.
    Continue,
}

impl Decision {
    pub const ALL: [Decision; 4] = [
        Decision::Initialize,
        Decision::Reflect,
        Decision::Enrich,
        Decision::Continue,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Initialize => "initialize",
            Decision::Reflect => "reflect",
            Decision::Enrich => "enrich",
            Decision::Continue => "continue",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decision::ALL
            .into_iter()
            .find(|d| d.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| format!("invalid decision: '{s}'"))
    }
}

/// Lifecycle phase of a project across sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Initialized,
    DataCollected,
    StrategyBuilt,
    AwaitingResults,
    Optimizing,
    Completed,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Initialized,
        Phase::DataCollected,
        Phase::StrategyBuilt,
        Phase::AwaitingResults,
        Phase::Optimizing,
        Phase::Completed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Initialized => "initialized",
            Phase::DataCollected => "data_collected",
            Phase::StrategyBuilt => "strategy_built",
            Phase::AwaitingResults => "awaiting_results",
            Phase::Optimizing => "optimizing",
            Phase::Completed => "completed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("invalid phase: '{s}'"))
    }
}

/// The router's stored decision. Resumption reads it instead of re-running the router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterDecision {
    pub decision: Decision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_action: Option<String>,
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

/// An input artifact uploaded for this session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedArtifact {
    /// Content-addressable path in blob storage (also the cache key).
    pub storage_path: String,
    pub original_filename: String,
}

/// Per-session analysis of one artifact, either fresh or served from cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactAnalysis {
    pub storage_path: String,
    pub file_name: String,
    /// Classified type (e.g. `historical`, `experiment_results`, `enrichment`).
    pub artifact_type: String,
    #[serde(default)]
    pub row_count: u64,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub metrics: Value,
    /// Raw rows; only present for fresh analyses and never persisted.
    #[serde(default, skip_serializing)]
    pub rows: Vec<Value>,
    /// Whether the metadata came from the artifact cache.
    #[serde(default)]
    pub cached: bool,
    /// Previously computed aggregate result for this artifact, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_result: Option<Value>,
}

// ---------------------------------------------------------------------------
// WorkflowState
// ---------------------------------------------------------------------------

/// The mutable context threaded through all steps of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    /// Owning entity (project).
    pub project_id: Uuid,
    /// Session row for this invocation, once created.
    #[serde(default)]
    pub session_id: Option<Uuid>,
    #[serde(default)]
    pub session_num: u32,
    /// Monotonic counter bumped by every step.
    #[serde(default)]
    pub cycle_num: u64,

    #[serde(default)]
    pub uploaded_files: Vec<UploadedArtifact>,
    #[serde(default)]
    pub file_analyses: Vec<ArtifactAnalysis>,

    #[serde(default)]
    pub decision: Option<RouterDecision>,

    /// Checkpoint fields.
    #[serde(default)]
    pub flow: FlowCheckpoint,

    #[serde(default)]
    pub project_loaded: bool,
    #[serde(default)]
    pub current_phase: Phase,
    #[serde(default)]
    pub iteration: u32,

    /// Domain payload, opaque to the engine.
    #[serde(default)]
    pub payload: BTreeMap<String, Value>,
    /// Read view of shared append-only collections. Written only through
    /// the concurrency guard.
    #[serde(default)]
    pub collections: BTreeMap<String, Vec<Value>>,

    /// Append-only failure log.
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub messages: Vec<String>,
}

impl WorkflowState {
    /// Fresh state for a new session on `project_id`.
    pub fn new(project_id: Uuid, uploaded_files: Vec<UploadedArtifact>) -> Self {
        Self {
            project_id,
            session_id: None,
            session_num: 1,
            cycle_num: 0,
            uploaded_files,
            file_analyses: Vec::new(),
            decision: None,
            flow: FlowCheckpoint::default(),
            project_loaded: false,
            current_phase: Phase::Initialized,
            iteration: 0,
            payload: BTreeMap::new(),
            collections: BTreeMap::new(),
            errors: Vec::new(),
            messages: Vec::new(),
        }
    }

    pub fn payload_value(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    pub fn set_payload(&mut self, key: impl Into<String>, value: Value) {
        self.payload.insert(key.into(), value);
    }

    /// Mutable access to a JSON object in the payload, created empty on first use.
    pub fn payload_object(&mut self, key: &str) -> &mut serde_json::Map<String, Value> {
        let entry = self
            .payload
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Default::default()));
        if !entry.is_object() {
            *entry = Value::Object(Default::default());
        }
        match entry {
            Value::Object(map) => map,
            _ => unreachable!("entry was just normalised to an object"),
        }
    }

    /// Store the router's decision, mirrored into the payload so it survives a restart.
    pub fn set_decision(&mut self, decision: RouterDecision) {
        if let Ok(value) = serde_json::to_value(&decision) {
            self.payload.insert(ROUTER_DECISION.to_string(), value);
        }
        self.decision = Some(decision);
    }

    pub fn collection(&self, name: &str) -> &[Value] {
        self.collections.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn push_message(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    pub fn bump_cycle(&mut self) {
        self.cycle_num += 1;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
