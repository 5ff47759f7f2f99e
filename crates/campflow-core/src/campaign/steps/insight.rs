//! `insight`: turn collected data into a campaign strategy.

use std::sync::Arc;

use campflow_types::project::KNOWLEDGE_FACTS;
use campflow_types::workflow::{Phase, WorkflowState};
use futures_util::future::BoxFuture;
use serde_json::{Map, Value, json};

use crate::campaign::services::CampaignServices;
use crate::campaign::{
    CURRENT_STRATEGY, EXPERIMENT_PLAN, HISTORICAL_DATA, INSIGHT, MARKET_DATA, STEP_OUTPUTS,
    USER_INPUTS,
};
use crate::external::generator::{GenerationRequest, GenerationTask};
use crate::repository::artifact_cache::ArtifactCacheStore;
use crate::repository::project::ProjectRepository;
use crate::workflow::cache::{AggregateMode, cached_results};
use crate::workflow::step::{Step, StepError};

use super::discovery::{TEMP_ENRICHMENT, TEMP_HISTORICAL};

/// Raw rows of each kind passed to the strategy call.
const SAMPLE_ROWS: usize = 10;

const INSTRUCTION: &str = "You are a campaign strategist. Using the user inputs, knowledge \
facts, historical performance and market data, produce a testing strategy. Respond with JSON: \
{\"insights\", \"target_audience\", \"channels\", \"creative_angles\", \"budget_allocation\", \
\"execution_timeline\"}.";

/// Builds the strategy, reusing a cached one when every input artifact
/// already carries it.
pub struct InsightStep<P: ProjectRepository, C: ArtifactCacheStore> {
    services: Arc<CampaignServices<P, C>>,
}

impl<P: ProjectRepository, C: ArtifactCacheStore> InsightStep<P, C> {
    pub fn new(services: Arc<CampaignServices<P, C>>) -> Self {
        Self { services }
    }

    async fn execute(&self, state: &mut WorkflowState) -> Result<(), StepError> {
        let mode = AggregateMode::classify(&state.file_analyses);
        tracing::debug!(project_id = %state.project_id, ?mode, "building strategy");

        let cached_strategy = match mode {
            AggregateMode::AllCached => cached_results(&state.file_analyses)
                .into_iter()
                .find_map(|(_, result)| result.get("strategy").cloned()),
            _ => None,
        };

        let strategy = match cached_strategy {
            Some(strategy) => {
                state.push_message("Using cached insights (no generation call)");
                strategy
            }
            None => {
                let request = GenerationRequest::new(
                    GenerationTask::Strategy,
                    INSTRUCTION,
                    context(state, mode),
                );
                let strategy = self.services.generate(&request).await?;
                self.services
                    .cache
                    .store_result(
                        state.project_id,
                        &state.uploaded_files,
                        &json!({
                            "strategy": strategy,
                            "execution_timeline": strategy.get("execution_timeline"),
                        }),
                    )
                    .await?;
                state.push_message("Strategy generated");
                strategy
            }
        };

        let plan = strategy
            .get("execution_timeline")
            .filter(|v| !v.is_null())
            .cloned()
            .unwrap_or_else(|| json!({}));
        state.set_payload(CURRENT_STRATEGY, strategy);
        state.set_payload(EXPERIMENT_PLAN, plan);
        state.current_phase = Phase::StrategyBuilt;

        let outputs = state.payload_object(STEP_OUTPUTS);
        outputs.remove(TEMP_HISTORICAL);
        outputs.remove(TEMP_ENRICHMENT);
        Ok(())
    }
}

impl<P: ProjectRepository, C: ArtifactCacheStore> Step for InsightStep<P, C> {
    fn name(&self) -> &str {
        INSIGHT
    }

    fn run<'a>(&'a self, state: &'a mut WorkflowState) -> BoxFuture<'a, Result<(), StepError>> {
        Box::pin(self.execute(state))
    }
}

fn sample(state: &WorkflowState, key: &str) -> Value {
    let rows = state
        .payload_value(STEP_OUTPUTS)
        .and_then(|outputs| outputs.get(key))
        .and_then(Value::as_array)
        .map(|rows| rows.iter().take(SAMPLE_ROWS).cloned().collect())
        .unwrap_or_default();
    Value::Array(rows)
}

fn context(state: &WorkflowState, mode: AggregateMode) -> Value {
    let payload = |key: &str| state.payload_value(key).cloned().unwrap_or(Value::Null);
    let mut context = Map::new();
    context.insert("user_inputs".into(), payload(USER_INPUTS));
    context.insert("knowledge_facts".into(), payload(KNOWLEDGE_FACTS));
    context.insert("historical_data".into(), payload(HISTORICAL_DATA));
    context.insert("market_data".into(), payload(MARKET_DATA));
    context.insert("historical_sample".into(), sample(state, TEMP_HISTORICAL));
    context.insert("enrichment_sample".into(), sample(state, TEMP_ENRICHMENT));
    if mode == AggregateMode::Hybrid {
        let cached: Map<String, Value> = cached_results(&state.file_analyses)
            .into_iter()
            .map(|(file, result)| (file.to_string(), result.clone()))
            .collect();
        context.insert("cached_insights".into(), Value::Object(cached));
    }
    Value::Object(context)
}
