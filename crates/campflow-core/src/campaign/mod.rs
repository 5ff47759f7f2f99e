//! The campaign-refinement flow: step bodies, router table and graph wiring.
//!
//! ```text
//! load_context -> analyze_files -> router
//! router -> discovery | user_input | data_collection | insight
//!         | campaign_setup | reflection | adjustment | save
//! discovery, user_input -> data_collection -> insight -> campaign_setup -> save
//! reflection -> adjustment -> save
//! ```

pub mod routes;
pub mod services;
pub mod steps;

use std::sync::Arc;

use campflow_types::workflow::{Decision, WorkflowState};

use crate::repository::artifact_cache::ArtifactCacheStore;
use crate::repository::project::ProjectRepository;
use crate::workflow::graph::{GraphError, Selector, WorkflowGraph};
use crate::workflow::step::Step;

use self::routes::RouteTable;
use self::services::CampaignServices;
use self::steps::{
    AdjustmentStep, AnalyzeFilesStep, CampaignSetupStep, DataCollectionStep, DiscoveryStep,
    InsightStep, LoadContextStep, ReflectionStep, RouterStep, SaveStep,
};

// ---------------------------------------------------------------------------
// Step names
// ---------------------------------------------------------------------------

pub const LOAD_CONTEXT: &str = "load_context";
pub const ANALYZE_FILES: &str = "analyze_files";
pub const ROUTER: &str = "router";
pub const DISCOVERY: &str = "discovery";
pub const USER_INPUT: &str = "user_input";
pub const DATA_COLLECTION: &str = "data_collection";
pub const INSIGHT: &str = "insight";
pub const CAMPAIGN_SETUP: &str = "campaign_setup";
pub const REFLECTION: &str = "reflection";
pub const ADJUSTMENT: &str = "adjustment";
pub const SAVE: &str = "save";

/// Steps the router may hand control to.
pub const ROUTER_TARGETS: [&str; 8] = [
    DISCOVERY,
    USER_INPUT,
    DATA_COLLECTION,
    INSIGHT,
    CAMPAIGN_SETUP,
    REFLECTION,
    ADJUSTMENT,
    SAVE,
];

// ---------------------------------------------------------------------------
// Shared collections and payload keys
// ---------------------------------------------------------------------------

pub const CONFIG_HISTORY: &str = "config_history";
pub const METRICS_TIMELINE: &str = "metrics_timeline";
pub const PATCH_HISTORY: &str = "patch_history";
pub const EXPERIMENT_RESULTS: &str = "experiment_results";

pub const USER_INPUTS: &str = "user_inputs";
pub const HISTORICAL_DATA: &str = "historical_data";
pub const MARKET_DATA: &str = "market_data";
pub const STEP_OUTPUTS: &str = "step_outputs";
pub const CURRENT_STRATEGY: &str = "current_strategy";
pub const EXPERIMENT_PLAN: &str = "experiment_plan";
pub const CURRENT_CONFIG: &str = "current_config";
pub const PUBLISH_RESULT: &str = "publish_result";
pub const BEST_PERFORMERS: &str = "best_performers";
pub const THRESHOLD_STATUS: &str = "threshold_status";

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// Wire the campaign steps into a validated graph.
///
/// The router's successor comes from `routes`, keyed by the stored decision
/// and, for `continue`, the project phase. Unknown checkpoints resume at the
/// router.
pub fn build_campaign_graph<P, C>(
    services: Arc<CampaignServices<P, C>>,
    routes: RouteTable,
) -> Result<WorkflowGraph, GraphError>
where
    P: ProjectRepository + 'static,
    C: ArtifactCacheStore + 'static,
{
    let selector: Selector = Arc::new(move |state: &WorkflowState| {
        let decision = state
            .decision
            .as_ref()
            .map(|d| d.decision)
            .unwrap_or(Decision::Initialize);
        routes.target(decision, state.current_phase).to_string()
    });

    let steps: Vec<Arc<dyn Step>> = vec![
        Arc::new(LoadContextStep::new(Arc::clone(&services))),
        Arc::new(AnalyzeFilesStep::new(Arc::clone(&services))),
        Arc::new(RouterStep::new(Arc::clone(&services))),
        Arc::new(DiscoveryStep::new(DISCOVERY, Arc::clone(&services))),
        Arc::new(DiscoveryStep::new(USER_INPUT, Arc::clone(&services))),
        Arc::new(DataCollectionStep::new(Arc::clone(&services))),
        Arc::new(InsightStep::new(Arc::clone(&services))),
        Arc::new(CampaignSetupStep::new(Arc::clone(&services))),
        Arc::new(ReflectionStep::new(Arc::clone(&services))),
        Arc::new(AdjustmentStep::new(Arc::clone(&services))),
        Arc::new(SaveStep),
    ];

    steps
        .into_iter()
        .fold(WorkflowGraph::builder(), |builder, step| builder.step(step))
        .entry(LOAD_CONTEXT)
        .reentry(ROUTER)
        .edge(LOAD_CONTEXT, ANALYZE_FILES)
        .edge(ANALYZE_FILES, ROUTER)
        .conditional(ROUTER, selector, ROUTER_TARGETS.map(|t| (t, t)))
        .edge(DISCOVERY, DATA_COLLECTION)
        .edge(USER_INPUT, DATA_COLLECTION)
        .edge(DATA_COLLECTION, INSIGHT)
        .edge(INSIGHT, CAMPAIGN_SETUP)
        .edge(CAMPAIGN_SETUP, SAVE)
        .edge(REFLECTION, ADJUSTMENT)
        .edge(ADJUSTMENT, SAVE)
        .build()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
