//! Project persistence types for Campflow.
//!
//! A project is the long-lived business entity a workflow refines across
//! sessions. The persisted row carries the flow checkpoint, the opaque payload,
//! and the shared append-only collections guarded by a version counter.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::workflow::{
    Decision, FlowCheckpoint, Phase, ROUTER_DECISION, RouterDecision, UploadedArtifact,
    WorkflowState,
};

/// Payload key persisted in its own, optional `knowledge_facts` column.
pub const KNOWLEDGE_FACTS: &str = "knowledge_facts";

/// Optional columns a store may or may not have, depending on its migration level.
pub const OPTIONAL_COLUMNS: &[&str] = &[KNOWLEDGE_FACTS];

// ---------------------------------------------------------------------------
// ProjectRecord
// ---------------------------------------------------------------------------

/// A persisted project row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: Uuid,
    pub name: String,
    pub user_id: Option<String>,
    pub product_description: Option<String>,
    pub target_budget: Option<f64>,
    pub phase: Phase,
    pub iteration: u32,
    /// Number of sessions started against this project.
    pub session_count: u32,
    pub checkpoint: FlowCheckpoint,
    pub payload: BTreeMap<String, Value>,
    /// `None` when the column is absent from the store or never written.
    pub knowledge_facts: Option<Value>,
    pub errors: Vec<String>,
    pub collections: BTreeMap<String, Vec<Value>>,
    pub collections_version: ConcurrencyToken,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to create a new project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewProject {
    pub name: String,
    pub user_id: Option<String>,
    pub product_description: Option<String>,
    pub target_budget: Option<f64>,
}

// ---------------------------------------------------------------------------
// ProjectSnapshot
// ---------------------------------------------------------------------------

/// Full-state overwrite written after every step.
///
/// Never includes the shared collections; those only change through the
/// concurrency guard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    pub id: Uuid,
    pub phase: Phase,
    pub iteration: u32,
    pub session_count: u32,
    pub checkpoint: FlowCheckpoint,
    pub payload: BTreeMap<String, Value>,
    pub knowledge_facts: Option<Value>,
    pub errors: Vec<String>,
}

impl ProjectSnapshot {
    /// Optional columns this snapshot carries a value for.
    pub fn optional_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.knowledge_facts.is_some() {
            fields.push(KNOWLEDGE_FACTS);
        }
        fields
    }

    /// Drop an optional field. Unknown names are ignored.
    pub fn without_field(mut self, field: &str) -> Self {
        if field == KNOWLEDGE_FACTS {
            self.knowledge_facts = None;
        }
        self
    }

    /// Drop every optional field the store cannot hold.
    pub fn restricted_to(self, capabilities: &SchemaCapabilities) -> Self {
        self.optional_fields()
            .into_iter()
            .filter(|field| !capabilities.supports(field))
            .fold(self, |snapshot, field| snapshot.without_field(field))
    }
}

// ---------------------------------------------------------------------------
// SchemaCapabilities
// ---------------------------------------------------------------------------

/// Optional columns present in the backing store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaCapabilities {
    optional_columns: BTreeSet<String>,
}

impl SchemaCapabilities {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            optional_columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// A store with every known optional column.
    pub fn all() -> Self {
        Self::new(OPTIONAL_COLUMNS.iter().copied())
    }

    pub fn supports(&self, column: &str) -> bool {
        self.optional_columns.contains(column)
    }

    /// Forget a column. Returns whether it was previously supported.
    pub fn drop_column(&mut self, column: &str) -> bool {
        self.optional_columns.remove(column)
    }

    /// Known optional columns the store lacks.
    pub fn missing(&self) -> Vec<&'static str> {
        OPTIONAL_COLUMNS
            .iter()
            .copied()
            .filter(|c| !self.supports(c))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Concurrency token and versioned collections
// ---------------------------------------------------------------------------

/// Strictly monotonic version of a project's shared collections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConcurrencyToken(pub u64);

impl ConcurrencyToken {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for ConcurrencyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A collection read together with the version it was read at.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionedCollection {
    pub items: Vec<Value>,
    pub version: ConcurrencyToken,
}

// ---------------------------------------------------------------------------
// Sessions and step cycles
// ---------------------------------------------------------------------------

/// Lifecycle of one workflow invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Running => write!(f, "running"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(SessionStatus::Running),
            "completed" => Ok(SessionStatus::Completed),
            "failed" => Ok(SessionStatus::Failed),
            other => Err(format!("invalid session status: '{other}'")),
        }
    }
}

/// A persisted session row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: Uuid,
    pub project_id: Uuid,
    pub session_num: u32,
    pub status: SessionStatus,
    pub uploaded_files: Vec<UploadedArtifact>,
    pub decision: Option<Decision>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// One executed step, logged with its duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepCycle {
    pub id: Uuid,
    pub session_id: Uuid,
    pub project_id: Uuid,
    pub step_name: String,
    pub cycle_num: u64,
    pub execution_time_ms: u64,
    pub success: bool,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// WorkflowState <-> ProjectRecord
// ---------------------------------------------------------------------------

impl WorkflowState {
    /// Copy persisted project state into this session's state.
    ///
    /// Transient checkpoint flags (`is_resuming`, `force_restart`) are kept
    /// from the caller; everything else comes from the record.
    pub fn hydrate(&mut self, record: &ProjectRecord) {
        self.project_id = record.id;
        self.project_loaded = true;
        self.current_phase = record.phase;
        self.iteration = record.iteration;
        self.session_num = record.session_count + 1;

        let force_restart = self.flow.force_restart;
        self.flow = FlowCheckpoint {
            is_resuming: false,
            force_restart,
            ..record.checkpoint.clone()
        };

        self.payload = record.payload.clone();
        if let Some(facts) = &record.knowledge_facts {
            self.payload.insert(KNOWLEDGE_FACTS.to_string(), facts.clone());
        }
        self.decision = record
            .payload
            .get(ROUTER_DECISION)
            .and_then(|value| serde_json::from_value::<RouterDecision>(value.clone()).ok());
        self.collections = record.collections.clone();
        self.errors = record.errors.clone();
    }

    /// Snapshot of everything `save` persists.
    pub fn snapshot(&self) -> ProjectSnapshot {
        let mut payload = self.payload.clone();
        let knowledge_facts = payload.remove(KNOWLEDGE_FACTS);
        ProjectSnapshot {
            id: self.project_id,
            phase: self.current_phase,
            iteration: self.iteration,
            session_count: self.session_num,
            checkpoint: self.flow.clone(),
            payload,
            knowledge_facts,
            errors: self.errors.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
