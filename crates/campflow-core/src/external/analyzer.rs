//! Artifact analyzer contract: parse and classify a downloaded artifact.

use campflow_types::cache::ArtifactMetadata;
use campflow_types::error::CallError;
use serde_json::Value;

/// Output of analyzing one artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedArtifact {
    /// Classified type (`historical`, `experiment_results`, `enrichment`, `unknown`).
    pub artifact_type: String,
    pub metadata: ArtifactMetadata,
    /// Parsed rows, one JSON object per record.
    pub rows: Vec<Value>,
}

/// Parses artifact bytes. CPU-bound; implementations must not block on I/O.
pub trait ArtifactAnalyzer: Send + Sync {
    fn analyze(&self, file_name: &str, bytes: &[u8]) -> Result<AnalyzedArtifact, CallError>;
}
