//! Artifact cache types.
//!
//! One record per (project, artifact key). Records outlive sessions and are
//! refreshed in place, never duplicated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Metadata extracted from an artifact by the analyzer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    #[serde(default)]
    pub row_count: u64,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub metrics: Value,
}

/// A cached per-artifact analysis and optional aggregate result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub project_id: Uuid,
    /// Storage path of the artifact.
    pub artifact_key: String,
    pub original_filename: String,
    pub artifact_type: Option<String>,
    pub metadata: Option<ArtifactMetadata>,
    pub cached_result: Option<Value>,
    pub last_computed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CacheRecord {
    /// A record counts as a hit only when both metadata and type are present.
    pub fn is_analysis_hit(&self) -> bool {
        self.metadata.is_some() && self.artifact_type.is_some()
    }

    pub fn has_result(&self) -> bool {
        self.cached_result.is_some()
    }
}

/// Upsert payload. `None` fields leave the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheUpdate {
    pub original_filename: Option<String>,
    pub artifact_type: Option<String>,
    pub metadata: Option<ArtifactMetadata>,
    pub cached_result: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(artifact_type: Option<&str>, metadata: bool) -> CacheRecord {
        let now = Utc::now();
        CacheRecord {
            project_id: Uuid::nil(),
            artifact_key: "projects/p/abc.csv".into(),
            original_filename: "q1.csv".into(),
            artifact_type: artifact_type.map(String::from),
            metadata: metadata.then(ArtifactMetadata::default),
            cached_result: None,
            last_computed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_hit_requires_metadata_and_type() {
        assert!(record(Some("historical"), true).is_analysis_hit());
        assert!(!record(None, true).is_analysis_hit());
        assert!(!record(Some("historical"), false).is_analysis_hit());
    }

    #[test]
    fn test_metadata_defaults_from_partial_json() {
        let meta: ArtifactMetadata = serde_json::from_str(r#"{"row_count": 12}"#).unwrap();
        assert_eq!(meta.row_count, 12);
        assert!(meta.columns.is_empty());
        assert!(meta.metrics.is_null());
    }
}
