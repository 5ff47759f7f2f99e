//! `router`: classify the session into a [`Decision`].

use std::sync::Arc;

use campflow_types::workflow::{Decision, RouterDecision, WorkflowState};
use futures_util::future::BoxFuture;
use serde_json::{Value, json};

use crate::campaign::services::CampaignServices;
use crate::campaign::{CURRENT_CONFIG, CURRENT_STRATEGY, EXPERIMENT_RESULTS, ROUTER};
use crate::external::generator::{GenerationRequest, GenerationTask};
use crate::repository::artifact_cache::ArtifactCacheStore;
use crate::repository::project::ProjectRepository;
use crate::workflow::step::{Step, StepError};

const INSTRUCTION: &str = "You route a campaign optimization agent. Decide the next action: \
\"initialize\" when there is no strategy yet, \"reflect\" when experiment results were uploaded, \
\"enrich\" when additional context was uploaded, \"continue\" to resume the current phase. \
Respond with JSON: {\"decision\", \"reasoning\", \"next_action\", \"confidence\"}.";

/// Asks the generator for a decision; falls back to `initialize` when the
/// call or its response is unusable. Never fails.
pub struct RouterStep<P: ProjectRepository, C: ArtifactCacheStore> {
    services: Arc<CampaignServices<P, C>>,
}

impl<P: ProjectRepository, C: ArtifactCacheStore> RouterStep<P, C> {
    pub fn new(services: Arc<CampaignServices<P, C>>) -> Self {
        Self { services }
    }

    async fn execute(&self, state: &mut WorkflowState) -> Result<(), StepError> {
        let request = GenerationRequest::new(GenerationTask::RouteDecision, INSTRUCTION, context(state))
            .with_temperature(0.3);

        let decision = match self.services.generate(&request).await {
            Ok(response) => parse_decision(&response),
            Err(e) => Err(e.to_string()),
        };

        let decision = decision.unwrap_or_else(|error| {
            tracing::warn!(
                project_id = %state.project_id,
                error = error.as_str(),
                "router fell back to initialize"
            );
            state.record_error(format!("Router error: {error}"));
            RouterDecision {
                decision: Decision::Initialize,
                reasoning: Some("Fallback decision due to error".to_string()),
                next_action: None,
            }
        });

        state.push_message(format!("Router decision: {}", decision.decision));
        if let Some(reasoning) = &decision.reasoning {
            state.push_message(format!("Reasoning: {reasoning}"));
        }
        tracing::info!(
            project_id = %state.project_id,
            decision = %decision.decision,
            "routing decision"
        );
        state.set_decision(decision);
        Ok(())
    }
}

impl<P: ProjectRepository, C: ArtifactCacheStore> Step for RouterStep<P, C> {
    fn name(&self) -> &str {
        ROUTER
    }

    fn run<'a>(&'a self, state: &'a mut WorkflowState) -> BoxFuture<'a, Result<(), StepError>> {
        Box::pin(self.execute(state))
    }
}

fn context(state: &WorkflowState) -> Value {
    let files: Vec<Value> = state
        .file_analyses
        .iter()
        .map(|a| {
            json!({
                "file_name": a.file_name,
                "type": a.artifact_type,
                "row_count": a.row_count,
                "columns": a.columns,
                "metrics": a.metrics,
            })
        })
        .collect();
    json!({
        "project_loaded": state.project_loaded,
        "current_phase": state.current_phase,
        "iteration": state.iteration,
        "has_strategy": state.payload_value(CURRENT_STRATEGY).is_some(),
        "has_config": state.payload_value(CURRENT_CONFIG).is_some(),
        "num_experiments": state.collection(EXPERIMENT_RESULTS).len(),
        "file_analyses": files,
    })
}

fn parse_decision(response: &Value) -> Result<RouterDecision, String> {
    let label = response
        .get("decision")
        .and_then(Value::as_str)
        .ok_or_else(|| "response has no decision".to_string())?;
    let decision = label.parse::<Decision>()?;
    let text = |key: &str| response.get(key).and_then(Value::as_str).map(str::to_string);
    Ok(RouterDecision {
        decision,
        reasoning: text("reasoning"),
        next_action: text("next_action"),
    })
}
