//! `discovery` (also registered as `user_input`) and `data_collection`.
//!
//! Discovery builds the project's knowledge facts from three sources, in
//! order: inference over historical rows, parallel lookups, and the inputs the
//! project was created with. Each fact is `{value, confidence, source}`.

use std::sync::Arc;

use campflow_types::project::KNOWLEDGE_FACTS;
use campflow_types::workflow::{Phase, WorkflowState};
use futures_util::future::BoxFuture;
use serde_json::{Map, Value, json};

use crate::campaign::services::CampaignServices;
use crate::campaign::{
    DATA_COLLECTION, EXPERIMENT_RESULTS, HISTORICAL_DATA, MARKET_DATA, STEP_OUTPUTS, USER_INPUTS,
};
use crate::external::generator::{GenerationRequest, GenerationTask};
use crate::repository::artifact_cache::ArtifactCacheStore;
use crate::repository::project::ProjectRepository;
use crate::workflow::fanout::fan_out;
use crate::workflow::step::{Step, StepError};

use super::preview;

/// Facts below this confidence are reported as still needed.
const CONFIDENCE_THRESHOLD: f64 = 0.6;

/// Facts discovery must end up with.
const CRITICAL_FACTS: [&str; 2] = ["product_description", "target_budget"];

/// Facts mirrored into the user inputs payload.
const INPUT_FACTS: [&str; 5] = [
    "product_description",
    "target_cpa",
    "target_roas",
    "target_budget",
    "target_audience",
];

/// Historical rows sampled for inference.
const INFERENCE_SAMPLE: usize = 5;

/// Results requested per lookup.
const LOOKUP_RESULTS: usize = 3;

const INFER_INSTRUCTION: &str = "Analyze these campaign data samples and infer the product \
type or category, target audience hints and likely business goals. Respond with JSON: \
{\"product_type\", \"audience_hint\", \"business_goals\"}.";

pub(crate) const TEMP_HISTORICAL: &str = "temp_historical_data";
pub(crate) const TEMP_ENRICHMENT: &str = "temp_enrichment_data";

fn fact(value: Value, confidence: f64, source: &str) -> Value {
    json!({ "value": value, "confidence": confidence, "source": source })
}

fn confidence(fact: Option<&Value>) -> f64 {
    fact.and_then(|f| f.get("confidence"))
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
}

/// Product description from the knowledge facts, else the user inputs.
fn product(state: &WorkflowState) -> Option<String> {
    let from_facts = state
        .payload_value(KNOWLEDGE_FACTS)
        .and_then(|facts| facts.pointer("/product_description/value"))
        .and_then(Value::as_str);
    let from_inputs = state
        .payload_value(USER_INPUTS)
        .and_then(|inputs| inputs.get("product_description"))
        .and_then(Value::as_str);
    from_facts
        .or(from_inputs)
        .filter(|p| !p.trim().is_empty())
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// discovery
// ---------------------------------------------------------------------------

pub struct DiscoveryStep<P: ProjectRepository, C: ArtifactCacheStore> {
    name: &'static str,
    services: Arc<CampaignServices<P, C>>,
}

impl<P: ProjectRepository, C: ArtifactCacheStore> DiscoveryStep<P, C> {
    /// `name` lets the same body serve both `discovery` and `user_input`.
    pub fn new(name: &'static str, services: Arc<CampaignServices<P, C>>) -> Self {
        Self { name, services }
    }

    async fn execute(&self, state: &mut WorkflowState) -> Result<(), StepError> {
        let mut knowledge = match state.payload_value(KNOWLEDGE_FACTS) {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };

        state.push_message("[1/3] Inference from historical data");
        let inferred = self.infer_facts(state).await;
        if inferred.is_empty() {
            state.push_message("  no facts inferred");
        } else {
            state.push_message(format!("  inferred {} facts", inferred.len()));
            for (key, fact) in &inferred {
                state.push_message(format!("    - {key}: {}", preview(&fact["value"], 50)));
            }
            knowledge.extend(inferred);
        }

        state.push_message("[2/3] Parallel lookups");
        let found = self.search(state).await;
        if found.is_empty() {
            state.push_message("  no lookup results");
        } else {
            state.push_message(format!("  found {} facts", found.len()));
            knowledge.extend(found);
        }

        state.push_message("[3/3] Project inputs for critical facts");
        let provided = project_facts(state, &knowledge);
        if !provided.is_empty() {
            state.push_message(format!("  project provided {} facts", provided.len()));
            knowledge.extend(provided);
        }
        for key in CRITICAL_FACTS {
            let current = confidence(knowledge.get(key));
            if current < CONFIDENCE_THRESHOLD {
                state.push_message(format!(
                    "  {key} still needed (confidence {current:.2}, threshold {CONFIDENCE_THRESHOLD:.2})"
                ));
            }
        }

        state.push_message(format!("Total facts discovered: {}", knowledge.len()));
        tracing::info!(
            project_id = %state.project_id,
            step = self.name,
            facts = knowledge.len(),
            "discovery finished"
        );

        let inputs = state.payload_object(USER_INPUTS);
        for key in INPUT_FACTS {
            if let Some(value) = knowledge.get(key).and_then(|f| f.get("value")) {
                inputs.insert(key.to_string(), value.clone());
            }
        }
        state.set_payload(KNOWLEDGE_FACTS, Value::Object(knowledge));
        Ok(())
    }

    /// Infer facts from a sample of historical rows. Failures are reported, not raised.
    async fn infer_facts(&self, state: &mut WorkflowState) -> Map<String, Value> {
        let sample: Vec<Value> = state
            .file_analyses
            .iter()
            .filter(|a| a.artifact_type == "historical")
            .flat_map(|a| a.rows.iter().cloned())
            .take(INFERENCE_SAMPLE)
            .collect();
        let mut facts = Map::new();
        if sample.is_empty() {
            return facts;
        }

        let request = GenerationRequest::new(
            GenerationTask::InferFacts,
            INFER_INSTRUCTION,
            json!({ "samples": sample }),
        )
        .with_temperature(0.3);
        let response = match self.services.generate(&request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "fact inference failed");
                state.push_message(format!("  inference error: {e}"));
                return facts;
            }
        };

        for (field, key, confidence) in [
            ("product_type", "product_category", 0.7),
            ("audience_hint", "audience_hint", 0.6),
            ("business_goals", "business_goals", 0.5),
        ] {
            if let Some(value) = response.get(field).filter(|v| !v.is_null()) {
                facts.insert(key.to_string(), fact(value.clone(), confidence, "inference"));
            }
        }
        facts
    }

    /// Competitor and benchmark lookups for the product, run in parallel.
    async fn search(&self, state: &mut WorkflowState) -> Map<String, Value> {
        let mut facts = Map::new();
        let Some(lookup) = &self.services.lookup else {
            return facts;
        };
        let Some(product) = product(state) else {
            state.push_message("  lookups skipped (no product description yet)");
            return facts;
        };

        let queries = [
            ("competitors", format!("{product} competitors advertising strategies")),
            (
                "benchmarks",
                format!("{product} advertising CPA ROAS benchmarks industry standards"),
            ),
        ];
        let calls = queries
            .into_iter()
            .map(|(key, query)| {
                let lookup = Arc::clone(lookup);
                (key, async move { lookup.search(&query, LOOKUP_RESULTS).await })
            })
            .collect();

        let results = fan_out(self.services.fan_out_workers, calls).await;
        for (key, items) in results.succeeded {
            facts.insert(format!("market_{key}"), fact(Value::Array(items), 0.8, "lookup"));
        }
        for (key, error) in results.failed {
            state.push_message(format!("  lookup for {key} failed: {error}"));
        }
        facts
    }
}

/// Critical facts taken from the project's own inputs where nothing better is known.
fn project_facts(state: &WorkflowState, knowledge: &Map<String, Value>) -> Map<String, Value> {
    let mut facts = Map::new();
    let Some(Value::Object(inputs)) = state.payload_value(USER_INPUTS) else {
        return facts;
    };
    for key in CRITICAL_FACTS {
        if confidence(knowledge.get(key)) >= CONFIDENCE_THRESHOLD {
            continue;
        }
        if let Some(value) = inputs.get(key).filter(|v| !v.is_null()) {
            facts.insert(key.to_string(), fact(value.clone(), 1.0, "project"));
        }
    }
    facts
}

impl<P: ProjectRepository, C: ArtifactCacheStore> Step for DiscoveryStep<P, C> {
    fn name(&self) -> &str {
        self.name
    }

    fn run<'a>(&'a self, state: &'a mut WorkflowState) -> BoxFuture<'a, Result<(), StepError>> {
        Box::pin(self.execute(state))
    }
}

// ---------------------------------------------------------------------------
// data_collection
// ---------------------------------------------------------------------------

/// Folds this session's analyses into project data.
///
/// Historical and enrichment files contribute metadata only; their raw rows
/// are parked under step outputs for the insight step, which clears them.
/// Experiment results go to the shared `experiment_results` collection.
pub struct DataCollectionStep<P: ProjectRepository, C: ArtifactCacheStore> {
    services: Arc<CampaignServices<P, C>>,
}

impl<P: ProjectRepository, C: ArtifactCacheStore> DataCollectionStep<P, C> {
    pub fn new(services: Arc<CampaignServices<P, C>>) -> Self {
        Self { services }
    }

    async fn execute(&self, state: &mut WorkflowState) -> Result<(), StepError> {
        let analyses = std::mem::take(&mut state.file_analyses);
        let iteration = state.iteration;

        for analysis in &analyses {
            match analysis.artifact_type.as_str() {
                "historical" => {
                    let history = state.payload_object(HISTORICAL_DATA);
                    let metadata = history
                        .entry("metadata")
                        .or_insert_with(|| json!({"file_count": 0, "total_rows": 0, "files": []}));
                    let file_count = metadata["file_count"].as_u64().unwrap_or(0) + 1;
                    let total_rows = metadata["total_rows"].as_u64().unwrap_or(0) + analysis.row_count;
                    metadata["file_count"] = json!(file_count);
                    metadata["total_rows"] = json!(total_rows);
                    push_item(
                        &mut metadata["files"],
                        json!({
                            "name": analysis.file_name,
                            "rows": analysis.row_count,
                            "columns": analysis.columns,
                        }),
                    );
                    extend_array(state.payload_object(STEP_OUTPUTS), TEMP_HISTORICAL, &analysis.rows);
                }
                "experiment_results" => {
                    let entry = json!({
                        "iteration": iteration + 1,
                        "data": analysis.rows,
                        "metrics": analysis.metrics,
                    });
                    self.services
                        .guard
                        .append_to_state(state, EXPERIMENT_RESULTS, entry)
                        .await?;
                }
                "enrichment" => {
                    let market = state.payload_object(MARKET_DATA);
                    let entry = json!({
                        "file_name": analysis.file_name,
                        "row_count": analysis.row_count,
                        "columns": analysis.columns,
                    });
                    let metadata = market
                        .entry("enrichment_metadata")
                        .or_insert_with(|| json!([]));
                    push_item(metadata, entry);
                    extend_array(state.payload_object(STEP_OUTPUTS), TEMP_ENRICHMENT, &analysis.rows);
                }
                other => {
                    tracing::debug!(file = analysis.file_name.as_str(), artifact_type = other, "skipping artifact");
                }
            }
        }
        state.file_analyses = analyses;

        self.collect_benchmarks(state).await;

        let inputs = state.payload_value(USER_INPUTS).cloned().unwrap_or_default();
        for key in CRITICAL_FACTS {
            if inputs.get(key).is_none_or(Value::is_null) {
                state.push_message(format!("Note: {key} not provided"));
            }
        }

        state.current_phase = Phase::DataCollected;
        state.push_message("Data collected");
        Ok(())
    }

    /// One benchmark lookup per project, skipped when already collected.
    async fn collect_benchmarks(&self, state: &mut WorkflowState) {
        let Some(lookup) = &self.services.lookup else {
            return;
        };
        let already = state
            .payload_value(MARKET_DATA)
            .and_then(|m| m.get("benchmarks"))
            .is_some();
        let Some(product) = product(state).filter(|_| !already) else {
            return;
        };

        let query = format!("{product} advertising benchmarks CPA CTR ROAS");
        match lookup.search(&query, LOOKUP_RESULTS).await {
            Ok(results) => {
                state
                    .payload_object(MARKET_DATA)
                    .insert("benchmarks".into(), json!({ "search_query": query, "results": results }));
                state.push_message("Collected market benchmarks");
            }
            Err(e) => {
                tracing::warn!(error = %e, "benchmark lookup failed");
                state.push_message(format!("Benchmark lookup skipped: {e}"));
            }
        }
    }
}

fn push_item(slot: &mut Value, item: Value) {
    if !slot.is_array() {
        *slot = json!([]);
    }
    if let Value::Array(items) = slot {
        items.push(item);
    }
}

fn extend_array(outputs: &mut Map<String, Value>, key: &str, rows: &[Value]) {
    let slot = outputs.entry(key).or_insert_with(|| json!([]));
    if !slot.is_array() {
        *slot = json!([]);
    }
    if let Value::Array(items) = slot {
        items.extend(rows.iter().cloned());
    }
}

impl<P: ProjectRepository, C: ArtifactCacheStore> Step for DataCollectionStep<P, C> {
    fn name(&self) -> &str {
        DATA_COLLECTION
    }

    fn run<'a>(&'a self, state: &'a mut WorkflowState) -> BoxFuture<'a, Result<(), StepError>> {
        Box::pin(self.execute(state))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
