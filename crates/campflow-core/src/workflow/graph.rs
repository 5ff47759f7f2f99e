//! Step registry and graph definition.
//!
//! A graph has one entry step, fixed `step -> step` edges, and conditional
//! edges out of router steps. A conditional edge is a pure selector over the
//! workflow state returning a label, plus a `label -> step` table. Validation
//! uses `petgraph` to reject cycles; every graph has exactly one terminal step.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use campflow_types::workflow::WorkflowState;
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;

use super::step::Step;

/// Pure function choosing a conditional edge label from the current state.
pub type Selector = Arc<dyn Fn(&WorkflowState) -> String + Send + Sync>;

// ---------------------------------------------------------------------------
// ConditionalEdge
// ---------------------------------------------------------------------------

/// Outgoing edges of a router step.
#[derive(Clone)]
pub struct ConditionalEdge {
    selector: Selector,
    targets: BTreeMap<String, String>,
}

impl ConditionalEdge {
    pub fn new(selector: Selector, targets: BTreeMap<String, String>) -> Self {
        Self { selector, targets }
    }

    /// Label chosen for `state`.
    pub fn label(&self, state: &WorkflowState) -> String {
        (self.selector)(state)
    }

    /// Target step for `state`. An unmapped label is returned as the error.
    pub fn target(&self, state: &WorkflowState) -> Result<&str, String> {
        let label = self.label(state);
        match self.targets.get(&label) {
            Some(target) => Ok(target.as_str()),
            None => Err(label),
        }
    }

    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.targets.values().map(String::as_str)
    }
}

impl fmt::Debug for ConditionalEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionalEdge")
            .field("targets", &self.targets)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// WorkflowGraph
// ---------------------------------------------------------------------------

/// A validated step graph.
pub struct WorkflowGraph {
    steps: HashMap<String, Arc<dyn Step>>,
    /// Registration order, for display.
    order: Vec<String>,
    entry: String,
    terminal: String,
    reentry: String,
    fixed: HashMap<String, String>,
    conditional: HashMap<String, ConditionalEdge>,
}

impl WorkflowGraph {
    pub fn builder() -> GraphBuilder {
        GraphBuilder::default()
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn terminal(&self) -> &str {
        &self.terminal
    }

    /// Safe default step when a checkpoint names an unknown step.
    pub fn reentry(&self) -> &str {
        &self.reentry
    }

    pub fn step(&self, name: &str) -> Option<&Arc<dyn Step>> {
        self.steps.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.steps.contains_key(name)
    }

    pub fn is_terminal(&self, name: &str) -> bool {
        self.terminal == name
    }

    pub fn is_router(&self, name: &str) -> bool {
        self.conditional.contains_key(name)
    }

    pub fn conditional_edge(&self, name: &str) -> Option<&ConditionalEdge> {
        self.conditional.get(name)
    }

    pub fn fixed_successor(&self, name: &str) -> Option<&str> {
        self.fixed.get(name).map(String::as_str)
    }

    pub fn step_names(&self) -> &[String] {
        &self.order
    }

    /// The step that follows `name` for the given state.
    ///
    /// Returns `Ok(None)` after the terminal step.
    pub fn next_after(
        &self,
        name: &str,
        state: &WorkflowState,
    ) -> Result<Option<String>, GraphError> {
        if !self.contains(name) {
            return Err(GraphError::UnknownStep(name.to_string()));
        }
        if let Some(next) = self.fixed.get(name) {
            return Ok(Some(next.clone()));
        }
        if let Some(edge) = self.conditional.get(name) {
            return edge
                .target(state)
                .map(|target| Some(target.to_string()))
                .map_err(|label| GraphError::UnknownLabel {
                    router: name.to_string(),
                    label,
                });
        }
        Ok(None)
    }
}

impl fmt::Debug for WorkflowGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowGraph")
            .field("steps", &self.order)
            .field("entry", &self.entry)
            .field("terminal", &self.terminal)
            .field("fixed", &self.fixed)
            .field("conditional", &self.conditional)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// GraphBuilder
// ---------------------------------------------------------------------------

/// Collects steps and edges, then validates them into a [`WorkflowGraph`].
#[derive(Default)]
pub struct GraphBuilder {
    steps: Vec<Arc<dyn Step>>,
    entry: Option<String>,
    reentry: Option<String>,
    fixed: Vec<(String, String)>,
    conditional: Vec<(String, ConditionalEdge)>,
}

impl GraphBuilder {
    pub fn step(mut self, step: Arc<dyn Step>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn entry(mut self, name: impl Into<String>) -> Self {
        self.entry = Some(name.into());
        self
    }

    /// Re-entry point for unknown checkpoints. Defaults to the entry step.
    pub fn reentry(mut self, name: impl Into<String>) -> Self {
        self.reentry = Some(name.into());
        self
    }

    pub fn edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.fixed.push((from.into(), to.into()));
        self
    }

    pub fn conditional<I, L, T>(mut self, from: impl Into<String>, selector: Selector, targets: I) -> Self
    where
        I: IntoIterator<Item = (L, T)>,
        L: Into<String>,
        T: Into<String>,
    {
        let targets = targets
            .into_iter()
            .map(|(label, target)| (label.into(), target.into()))
            .collect();
        self.conditional
            .push((from.into(), ConditionalEdge::new(selector, targets)));
        self
    }

    pub fn build(self) -> Result<WorkflowGraph, GraphError> {
        let mut steps: HashMap<String, Arc<dyn Step>> = HashMap::new();
        let mut order = Vec::with_capacity(self.steps.len());
        for step in self.steps {
            let name = step.name().to_string();
            if steps.contains_key(&name) {
                return Err(GraphError::DuplicateStep(name));
            }
            order.push(name.clone());
            steps.insert(name, step);
        }

        let entry = self.entry.ok_or(GraphError::MissingEntry)?;
        if !steps.contains_key(&entry) {
            return Err(GraphError::UnknownStep(entry));
        }
        let reentry = self.reentry.unwrap_or_else(|| entry.clone());
        if !steps.contains_key(&reentry) {
            return Err(GraphError::UnknownStep(reentry));
        }

        let mut fixed = HashMap::new();
        for (from, to) in self.fixed {
            for endpoint in [&from, &to] {
                if !steps.contains_key(endpoint) {
                    return Err(GraphError::UnknownStep(endpoint.clone()));
                }
            }
            if fixed.contains_key(&from) {
                return Err(GraphError::DuplicateEdge(from));
            }
            fixed.insert(from, to);
        }

        let mut conditional = HashMap::new();
        for (from, edge) in self.conditional {
            if !steps.contains_key(&from) {
                return Err(GraphError::UnknownStep(from));
            }
            if fixed.contains_key(&from) {
                return Err(GraphError::MixedEdges(from));
            }
            if conditional.contains_key(&from) {
                return Err(GraphError::DuplicateEdge(from));
            }
            if edge.targets.is_empty() {
                return Err(GraphError::EmptyConditional(from));
            }
            if let Some(unknown) = edge.targets().find(|t| !steps.contains_key(*t)) {
                return Err(GraphError::UnknownStep(unknown.to_string()));
            }
            conditional.insert(from, edge);
        }

        let terminals: Vec<&String> = order
            .iter()
            .filter(|name| !fixed.contains_key(*name) && !conditional.contains_key(*name))
            .collect();
        if terminals.len() != 1 {
            return Err(GraphError::TerminalCount(
                terminals.into_iter().cloned().collect(),
            ));
        }
        let terminal = terminals[0].clone();

        check_acyclic(&order, &fixed, &conditional)?;

        Ok(WorkflowGraph {
            steps,
            order,
            entry,
            terminal,
            reentry,
            fixed,
            conditional,
        })
    }
}

/// Reject cycles over fixed edges plus every conditional target.
fn check_acyclic(
    order: &[String],
    fixed: &HashMap<String, String>,
    conditional: &HashMap<String, ConditionalEdge>,
) -> Result<(), GraphError> {
    let mut graph = DiGraph::<&str, ()>::new();
    let indices: HashMap<&str, _> = order
        .iter()
        .map(|name| (name.as_str(), graph.add_node(name.as_str())))
        .collect();

    let mut seen = HashSet::new();
    let edges = fixed
        .iter()
        .map(|(from, to)| (from.as_str(), to.as_str()))
        .chain(
            conditional
                .iter()
                .flat_map(|(from, edge)| edge.targets().map(move |to| (from.as_str(), to))),
        );
    for (from, to) in edges {
        if seen.insert((from, to)) {
            graph.add_edge(indices[from], indices[to], ());
        }
    }

    toposort(&graph, None).map(|_| ()).map_err(|cycle| {
        GraphError::CycleDetected(graph[cycle.node_id()].to_string())
    })
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from graph construction and traversal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("graph has no entry step")]
    MissingEntry,

    #[error("unknown step: '{0}'")]
    UnknownStep(String),

    #[error("step '{0}' registered twice")]
    DuplicateStep(String),

    #[error("step '{0}' has more than one outgoing edge")]
    DuplicateEdge(String),

    #[error("step '{0}' has both a fixed and a conditional edge")]
    MixedEdges(String),

    #[error("router '{0}' has no conditional targets")]
    EmptyConditional(String),

    #[error("expected exactly one terminal step, found {0:?}")]
    TerminalCount(Vec<String>),

    #[error("cycle detected involving step '{0}'")]
    CycleDetected(String),

    #[error("router '{router}' selected unmapped label '{label}'")]
    UnknownLabel { router: String, label: String },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
