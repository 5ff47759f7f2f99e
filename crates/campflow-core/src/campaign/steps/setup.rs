//! `campaign_setup`: derive a platform config from the strategy and publish it.

use std::sync::Arc;

use campflow_types::workflow::{Phase, WorkflowState};
use futures_util::future::BoxFuture;
use serde_json::{Value, json};

use crate::campaign::services::CampaignServices;
use crate::campaign::{
    CAMPAIGN_SETUP, CONFIG_HISTORY, CURRENT_CONFIG, CURRENT_STRATEGY, EXPERIMENT_PLAN,
    PUBLISH_RESULT, USER_INPUTS,
};
use crate::external::generator::{GenerationRequest, GenerationTask};
use crate::repository::artifact_cache::ArtifactCacheStore;
use crate::repository::project::ProjectRepository;
use crate::workflow::step::{Step, StepError};

const INSTRUCTION: &str = "Convert the campaign strategy and experiment plan into an ads \
platform configuration. Respond with JSON: {\"campaign_name\", \"objective\", \"budget\", \
\"ad_sets\", \"creatives\"}.";

/// Generates the config, publishes it when a publisher is configured, then
/// records it in `config_history`.
pub struct CampaignSetupStep<P: ProjectRepository, C: ArtifactCacheStore> {
    services: Arc<CampaignServices<P, C>>,
}

impl<P: ProjectRepository, C: ArtifactCacheStore> CampaignSetupStep<P, C> {
    pub fn new(services: Arc<CampaignServices<P, C>>) -> Self {
        Self { services }
    }

    async fn execute(&self, state: &mut WorkflowState) -> Result<(), StepError> {
        let payload = |key: &str| state.payload_value(key).cloned().unwrap_or(Value::Null);
        let context = json!({
            "strategy": payload(CURRENT_STRATEGY),
            "experiment_plan": payload(EXPERIMENT_PLAN),
            "user_inputs": payload(USER_INPUTS),
            "iteration": state.iteration,
        });
        let request = GenerationRequest::new(GenerationTask::CampaignConfig, INSTRUCTION, context)
            .with_temperature(0.5);
        let config = self.services.generate(&request).await?;
        state.set_payload(CURRENT_CONFIG, config.clone());

        if let Some(result) = self.services.publish(&config).await? {
            tracing::info!(project_id = %state.project_id, "campaign published");
            state.set_payload(PUBLISH_RESULT, result);
            state.push_message("Campaign published");
        }

        let entry = json!({ "iteration": state.iteration, "config": config });
        self.services
            .guard
            .append_to_state(state, CONFIG_HISTORY, entry)
            .await?;

        state.current_phase = Phase::AwaitingResults;
        state.push_message("Campaign configuration generated");
        Ok(())
    }
}

impl<P: ProjectRepository, C: ArtifactCacheStore> Step for CampaignSetupStep<P, C> {
    fn name(&self) -> &str {
        CAMPAIGN_SETUP
    }

    fn run<'a>(&'a self, state: &'a mut WorkflowState) -> BoxFuture<'a, Result<(), StepError>> {
        Box::pin(self.execute(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CampaignFixture, ScriptedGenerator, ThrottledPublisher};

    fn generator() -> ScriptedGenerator {
        ScriptedGenerator::new().respond(
            GenerationTask::CampaignConfig,
            json!({"campaign_name": "trail-q3", "budget": 5000}),
        )
    }

    #[tokio::test]
    async fn test_setup_without_publisher() {
        let fixture = CampaignFixture::new(generator());
        let step = CampaignSetupStep::new(fixture.services());
        let mut state = fixture.state(vec![]).await;

        step.run(&mut state).await.unwrap();

        assert_eq!(state.current_phase, Phase::AwaitingResults);
        assert_eq!(state.payload[CURRENT_CONFIG]["campaign_name"], "trail-q3");
        assert!(!state.payload.contains_key(PUBLISH_RESULT));
        let history = state.collection(CONFIG_HISTORY);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0]["iteration"], 0);
    }

    #[tokio::test]
    async fn test_setup_publishes_through_rate_limits() {
        let mut fixture = CampaignFixture::new(generator());
        let publisher = Arc::new(ThrottledPublisher::new(2));
        fixture.publisher = Some(Arc::clone(&publisher));
        let step = CampaignSetupStep::new(fixture.services());
        let mut state = fixture.state(vec![]).await;

        step.run(&mut state).await.unwrap();

        assert_eq!(state.payload[PUBLISH_RESULT]["campaign_id"], "cmp-1");
        assert_eq!(publisher.published().len(), 1);
        assert_eq!(state.collection(CONFIG_HISTORY).len(), 1);
    }

    #[tokio::test]
    async fn test_setup_publish_failure_skips_history() {
        let mut fixture = CampaignFixture::new(generator());
        fixture.publisher = Some(Arc::new(ThrottledPublisher::broken()));
        let step = CampaignSetupStep::new(fixture.services());
        let mut state = fixture.state(vec![]).await;

        let result = step.run(&mut state).await;

        assert!(matches!(result, Err(StepError::Call(_))));
        assert!(state.collection(CONFIG_HISTORY).is_empty());
        assert_eq!(state.current_phase, Phase::Initialized);
    }
}
