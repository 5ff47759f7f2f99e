//! `reflection` and `adjustment`: the optimize half of the campaign loop.

use std::sync::Arc;

use campflow_types::workflow::{Phase, WorkflowState};
use futures_util::future::BoxFuture;
use serde_json::{Value, json};

use crate::campaign::services::CampaignServices;
use crate::campaign::{
    ADJUSTMENT, BEST_PERFORMERS, CONFIG_HISTORY, CURRENT_CONFIG, CURRENT_STRATEGY,
    EXPERIMENT_RESULTS, HISTORICAL_DATA, METRICS_TIMELINE, PATCH_HISTORY, REFLECTION,
    STEP_OUTPUTS, THRESHOLD_STATUS,
};
use crate::external::generator::{GenerationRequest, GenerationTask};
use crate::repository::artifact_cache::ArtifactCacheStore;
use crate::repository::project::ProjectRepository;
use crate::workflow::step::{Step, StepError};

const REFLECTION_ANALYSIS: &str = "reflection_analysis";

const REFLECT_INSTRUCTION: &str = "Analyze the latest experiment results against the \
strategy. Identify winning and losing variants and whether the performance thresholds were \
met. Respond with JSON: {\"summary\", \"winners\", \"losers\", \"threshold_met\", \
\"recommendations\"}.";

const PATCH_INSTRUCTION: &str = "Propose changes to the current campaign configuration based \
on the reflection analysis. Respond with JSON: {\"patch\", \"reasoning\"}.";

const APPLY_INSTRUCTION: &str = "Apply the patch to the current campaign configuration and \
return the complete updated configuration as JSON.";

fn payload_or_null(state: &WorkflowState, key: &str) -> Value {
    state.payload_value(key).cloned().unwrap_or(Value::Null)
}

// ---------------------------------------------------------------------------
// reflection
// ---------------------------------------------------------------------------

/// Analyzes the latest experiment and decides whether the loop is done.
///
/// Reflection is routed to directly from the router, so it ingests this
/// session's experiment result files itself.
pub struct ReflectionStep<P: ProjectRepository, C: ArtifactCacheStore> {
    services: Arc<CampaignServices<P, C>>,
}

impl<P: ProjectRepository, C: ArtifactCacheStore> ReflectionStep<P, C> {
    pub fn new(services: Arc<CampaignServices<P, C>>) -> Self {
        Self { services }
    }

    async fn execute(&self, state: &mut WorkflowState) -> Result<(), StepError> {
        let uploads: Vec<Value> = state
            .file_analyses
            .iter()
            .filter(|a| a.artifact_type == "experiment_results")
            .map(|a| {
                json!({
                    "iteration": state.iteration + 1,
                    "data": a.rows,
                    "metrics": a.metrics,
                })
            })
            .collect();
        for entry in uploads {
            self.services
                .guard
                .append_to_state(state, EXPERIMENT_RESULTS, entry)
                .await?;
        }

        let Some(latest) = state.collection(EXPERIMENT_RESULTS).last().cloned() else {
            state.push_message("No experiment results to analyze");
            return Ok(());
        };

        let context = json!({
            "experiment": latest,
            "strategy": payload_or_null(state, CURRENT_STRATEGY),
            "historical_context": payload_or_null(state, HISTORICAL_DATA),
        });
        let request =
            GenerationRequest::new(GenerationTask::ReflectionAnalysis, REFLECT_INSTRUCTION, context);
        let analysis = self.services.generate(&request).await?;

        let entry = json!({ "iteration": state.iteration + 1, "analysis": analysis });
        self.services
            .guard
            .append_to_state(state, METRICS_TIMELINE, entry)
            .await?;

        let winners = analysis.get("winners").cloned().unwrap_or_else(|| json!([]));
        state.set_payload(BEST_PERFORMERS, winners);

        let threshold_met = analysis
            .get("threshold_met")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if threshold_met {
            state.set_payload(THRESHOLD_STATUS, json!("met"));
            state.current_phase = Phase::Completed;
            state.push_message("Performance thresholds met");
        } else {
            state.set_payload(THRESHOLD_STATUS, json!("not_met"));
            state.current_phase = Phase::Optimizing;
            state.push_message("Thresholds not met, optimizing");
        }
        tracing::info!(
            project_id = %state.project_id,
            iteration = state.iteration,
            threshold_met,
            "reflection finished"
        );

        state
            .payload_object(STEP_OUTPUTS)
            .insert(REFLECTION_ANALYSIS.into(), analysis);
        Ok(())
    }
}

impl<P: ProjectRepository, C: ArtifactCacheStore> Step for ReflectionStep<P, C> {
    fn name(&self) -> &str {
        REFLECTION
    }

    fn run<'a>(&'a self, state: &'a mut WorkflowState) -> BoxFuture<'a, Result<(), StepError>> {
        Box::pin(self.execute(state))
    }
}

// ---------------------------------------------------------------------------
// adjustment
// ---------------------------------------------------------------------------

/// Patches the live config while the project is optimizing; a no-op otherwise.
pub struct AdjustmentStep<P: ProjectRepository, C: ArtifactCacheStore> {
    services: Arc<CampaignServices<P, C>>,
}

impl<P: ProjectRepository, C: ArtifactCacheStore> AdjustmentStep<P, C> {
    pub fn new(services: Arc<CampaignServices<P, C>>) -> Self {
        Self { services }
    }

    async fn execute(&self, state: &mut WorkflowState) -> Result<(), StepError> {
        if state.current_phase != Phase::Optimizing {
            state.push_message(format!("No adjustment needed (phase {})", state.current_phase));
            return Ok(());
        }

        let current = payload_or_null(state, CURRENT_CONFIG);
        let context = json!({
            "current_config": current,
            "reflection": state
                .payload_value(STEP_OUTPUTS)
                .and_then(|outputs| outputs.get(REFLECTION_ANALYSIS))
                .cloned(),
            "best_performers": payload_or_null(state, BEST_PERFORMERS),
        });
        let request =
            GenerationRequest::new(GenerationTask::ConfigAdjustment, PATCH_INSTRUCTION, context)
                .with_temperature(0.5);
        let adjustment = self.services.generate(&request).await?;
        let patch = adjustment.get("patch").cloned().unwrap_or_else(|| json!({}));
        let reasoning = adjustment.get("reasoning").cloned().unwrap_or(Value::Null);

        let request = GenerationRequest::new(
            GenerationTask::CampaignConfig,
            APPLY_INSTRUCTION,
            json!({ "current_config": current, "patch": patch }),
        )
        .with_temperature(0.2);
        let config = self.services.generate(&request).await?;

        let version = state.iteration + 1;
        self.services
            .guard
            .append_to_state(
                state,
                PATCH_HISTORY,
                json!({ "iteration": version, "patch": patch, "reasoning": reasoning }),
            )
            .await?;
        self.services
            .guard
            .append_to_state(
                state,
                CONFIG_HISTORY,
                json!({ "iteration": version, "config": config }),
            )
            .await?;

        state.set_payload(CURRENT_CONFIG, config);
        state.iteration = version;
        state.current_phase = Phase::AwaitingResults;
        state.push_message(format!("Configuration updated to v{version}"));
        Ok(())
    }
}

impl<P: ProjectRepository, C: ArtifactCacheStore> Step for AdjustmentStep<P, C> {
    fn name(&self) -> &str {
        ADJUSTMENT
    }

    fn run<'a>(&'a self, state: &'a mut WorkflowState) -> BoxFuture<'a, Result<(), StepError>> {
        Box::pin(self.execute(state))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CampaignFixture, ScriptedGenerator};
    use campflow_types::workflow::ArtifactAnalysis;

    fn experiment_upload() -> ArtifactAnalysis {
        ArtifactAnalysis {
            storage_path: "projects/test/ab.csv".into(),
            file_name: "ab.csv".into(),
            artifact_type: "experiment_results".into(),
            row_count: 2,
            columns: vec!["variant".into(), "cpa".into()],
            metrics: json!({"avg_cpa": 11.5}),
            rows: vec![json!({"variant": "a", "cpa": 9}), json!({"variant": "b", "cpa": 14})],
            cached: false,
            cached_result: None,
        }
    }

    fn reflecting(threshold_met: bool) -> ScriptedGenerator {
        ScriptedGenerator::new().respond(
            GenerationTask::ReflectionAnalysis,
            json!({"summary": "a beat b", "winners": ["a"], "threshold_met": threshold_met}),
        )
    }

    #[tokio::test]
    async fn test_reflection_ingests_and_analyzes() {
        let generator = reflecting(false);
        let fixture = CampaignFixture::new(generator.clone());
        let step = ReflectionStep::new(fixture.services());
        let mut state = fixture.state(vec![]).await;
        state.file_analyses = vec![experiment_upload()];

        step.run(&mut state).await.unwrap();

        assert_eq!(state.collection(EXPERIMENT_RESULTS).len(), 1);
        assert_eq!(state.collection(METRICS_TIMELINE)[0]["iteration"], 1);
        assert_eq!(state.payload[BEST_PERFORMERS], json!(["a"]));
        assert_eq!(state.payload[THRESHOLD_STATUS], "not_met");
        assert_eq!(state.current_phase, Phase::Optimizing);
        assert_eq!(state.payload[STEP_OUTPUTS][REFLECTION_ANALYSIS]["summary"], "a beat b");

        let request = &generator.requests()[0];
        assert_eq!(request.context["experiment"]["metrics"]["avg_cpa"], 11.5);
    }

    #[tokio::test]
    async fn test_reflection_completes_when_threshold_met() {
        let fixture = CampaignFixture::new(reflecting(true));
        let step = ReflectionStep::new(fixture.services());
        let mut state = fixture.state(vec![]).await;
        state.file_analyses = vec![experiment_upload()];

        step.run(&mut state).await.unwrap();

        assert_eq!(state.payload[THRESHOLD_STATUS], "met");
        assert_eq!(state.current_phase, Phase::Completed);
    }

    #[tokio::test]
    async fn test_reflection_without_results_is_a_noop() {
        let generator = reflecting(true);
        let fixture = CampaignFixture::new(generator.clone());
        let step = ReflectionStep::new(fixture.services());
        let mut state = fixture.state(vec![]).await;

        step.run(&mut state).await.unwrap();

        assert!(generator.requests().is_empty());
        assert_eq!(state.current_phase, Phase::Initialized);
        assert_eq!(state.messages, vec!["No experiment results to analyze"]);
    }

    #[tokio::test]
    async fn test_adjustment_patches_config() {
        let generator = ScriptedGenerator::new()
            .respond(
                GenerationTask::ConfigAdjustment,
                json!({"patch": {"budget": 6000}, "reasoning": "variant a scales"}),
            )
            .respond(GenerationTask::CampaignConfig, json!({"campaign_name": "trail-q3", "budget": 6000}));
        let fixture = CampaignFixture::new(generator.clone());
        let step = AdjustmentStep::new(fixture.services());
        let mut state = fixture.state(vec![]).await;
        state.current_phase = Phase::Optimizing;
        state.set_payload(CURRENT_CONFIG, json!({"campaign_name": "trail-q3", "budget": 5000}));

        step.run(&mut state).await.unwrap();

        assert_eq!(state.iteration, 1);
        assert_eq!(state.current_phase, Phase::AwaitingResults);
        assert_eq!(state.payload[CURRENT_CONFIG]["budget"], 6000);
        assert_eq!(state.collection(PATCH_HISTORY)[0]["reasoning"], "variant a scales");
        assert_eq!(state.collection(CONFIG_HISTORY)[0]["iteration"], 1);
        assert_eq!(state.messages.last().unwrap(), "Configuration updated to v1");

        let apply = &generator.requests()[1];
        assert_eq!(apply.context["patch"], json!({"budget": 6000}));
        assert_eq!(apply.context["current_config"]["budget"], 5000);
    }

    #[tokio::test]
    async fn test_adjustment_skipped_unless_optimizing() {
        let generator = ScriptedGenerator::new();
        let fixture = CampaignFixture::new(generator.clone());
        let step = AdjustmentStep::new(fixture.services());
        let mut state = fixture.state(vec![]).await;
        state.current_phase = Phase::Completed;

        step.run(&mut state).await.unwrap();

        assert!(generator.requests().is_empty());
        assert_eq!(state.iteration, 0);
        assert!(state.collection(PATCH_HISTORY).is_empty());
    }
}
