//! Resumption resolver: where to continue after an interrupted flow.
//!
//! Pure and deterministic. Router steps are never re-run; the conditional edge
//! is chosen from the decision already stored in the state.

use campflow_types::workflow::WorkflowState;

use super::graph::WorkflowGraph;

/// Outcome of resolving a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Execute this step next.
    Next(String),
    /// The flow already reached its terminal step.
    Done,
}

/// Decide the next step after `last_completed`.
///
/// Total over every input: no checkpoint starts at the entry step, unknown
/// steps and unmapped router labels fall back to the graph's re-entry point.
pub fn resolve(
    graph: &WorkflowGraph,
    last_completed: Option<&str>,
    state: &WorkflowState,
) -> Resolution {
    let Some(last) = last_completed else {
        return Resolution::Next(graph.entry().to_string());
    };

    if !graph.contains(last) {
        tracing::warn!(
            step = last,
            reentry = graph.reentry(),
            "checkpoint names an unknown step, resuming at re-entry point"
        );
        return Resolution::Next(graph.reentry().to_string());
    }

    if graph.is_terminal(last) {
        return Resolution::Done;
    }

    if let Some(next) = graph.fixed_successor(last) {
        return Resolution::Next(next.to_string());
    }

    match graph.conditional_edge(last).map(|edge| edge.target(state)) {
        Some(Ok(target)) => Resolution::Next(target.to_string()),
        Some(Err(label)) => {
            tracing::warn!(
                router = last,
                label = label.as_str(),
                "stored decision maps to no step, resuming at re-entry point"
            );
            Resolution::Next(graph.reentry().to_string())
        }
        None => Resolution::Next(graph.reentry().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::workflow::graph::Selector;
    use crate::workflow::step::{FnStep, Step};
    use uuid::Uuid;

    fn noop(name: &str) -> Arc<dyn Step> {
        Arc::new(FnStep::new(name, |_state: &mut WorkflowState| Ok(())))
    }

    fn graph() -> WorkflowGraph {
        let selector: Selector = Arc::new(|state: &WorkflowState| {
            state
                .payload_value("route")
                .and_then(|v| v.as_str())
                .unwrap_or("a")
                .to_string()
        });
        WorkflowGraph::builder()
            .step(noop("load"))
            .step(noop("router"))
            .step(noop("a"))
            .step(noop("b"))
            .step(noop("save"))
            .entry("load")
            .reentry("router")
            .edge("load", "router")
            .conditional("router", selector, [("a", "a"), ("b", "b")])
            .edge("a", "save")
            .edge("b", "save")
            .build()
            .unwrap()
    }

    #[test]
    fn test_no_checkpoint_starts_at_entry() {
        let state = WorkflowState::new(Uuid::nil(), vec![]);
        assert_eq!(resolve(&graph(), None, &state), Resolution::Next("load".into()));
    }

    #[test]
    fn test_fixed_successor() {
        let state = WorkflowState::new(Uuid::nil(), vec![]);
        assert_eq!(
            resolve(&graph(), Some("load"), &state),
            Resolution::Next("router".into())
        );
        assert_eq!(
            resolve(&graph(), Some("b"), &state),
            Resolution::Next("save".into())
        );
    }

    #[test]
    fn test_router_uses_stored_decision() {
        let mut state = WorkflowState::new(Uuid::nil(), vec![]);
        state.set_payload("route", "b".into());
        assert_eq!(
            resolve(&graph(), Some("router"), &state),
            Resolution::Next("b".into())
        );
    }

    #[test]
    fn test_terminal_is_done() {
        let state = WorkflowState::new(Uuid::nil(), vec![]);
        assert_eq!(resolve(&graph(), Some("save"), &state), Resolution::Done);
    }

    #[test]
    fn test_unknown_step_and_label_fall_back_to_reentry() {
        let mut state = WorkflowState::new(Uuid::nil(), vec![]);
        assert_eq!(
            resolve(&graph(), Some("renamed_step"), &state),
            Resolution::Next("router".into())
        );

        state.set_payload("route", "zzz".into());
        assert_eq!(
            resolve(&graph(), Some("router"), &state),
            Resolution::Next("router".into())
        );
    }

    #[test]
    fn test_resolution_is_total_over_registered_steps() {
        let graph = graph();
        let state = WorkflowState::new(Uuid::nil(), vec![]);
        for name in graph.step_names() {
            match resolve(&graph, Some(name), &state) {
                Resolution::Next(next) => assert!(graph.contains(&next)),
                Resolution::Done => assert!(graph.is_terminal(name)),
            }
        }
    }
}
