//! Generator trait: the generative/analytical call every reasoning step uses.

use campflow_types::error::CallError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a generation request is for. Adapters may use it to pick prompts or models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationTask {
    RouteDecision,
    InferFacts,
    Strategy,
    CampaignConfig,
    ReflectionAnalysis,
    ConfigAdjustment,
}

impl GenerationTask {
    /// Human-readable label used in logs and progress output.
    pub fn label(self) -> &'static str {
        match self {
            GenerationTask::RouteDecision => "Router Decision",
            GenerationTask::InferFacts => "Fact Inference",
            GenerationTask::Strategy => "Strategy Generation",
            GenerationTask::CampaignConfig => "Campaign Config",
            GenerationTask::ReflectionAnalysis => "Reflection Analysis",
            GenerationTask::ConfigAdjustment => "Config Adjustment",
        }
    }
}

/// A single generation request. The response is always a JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub task: GenerationTask,
    /// Natural-language instruction for the call.
    pub instruction: String,
    /// Structured context the instruction refers to.
    pub context: Value,
    pub temperature: f32,
}

impl GenerationRequest {
    pub fn new(task: GenerationTask, instruction: impl Into<String>, context: Value) -> Self {
        Self {
            task,
            instruction: instruction.into(),
            context,
            temperature: 0.7,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Short preview of the instruction for progress output.
    pub fn preview(&self, max_chars: usize) -> String {
        let mut preview: String = self.instruction.chars().take(max_chars).collect();
        if self.instruction.chars().count() > max_chars {
            preview.push_str("...");
        }
        preview
    }
}

/// Generative backend.
///
/// Uses RPITIT (return-position `impl Trait` in traits) for async methods.
/// Wrap in [`BoxGenerator`](super::box_generator::BoxGenerator) for dynamic dispatch.
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;

    fn generate(
        &self,
        request: &GenerationRequest,
    ) -> impl std::future::Future<Output = Result<Value, CallError>> + Send;
}
