//! Campaign step bodies.
//!
//! Each step holds the shared [`CampaignServices`](super::services::CampaignServices)
//! and implements [`Step`](crate::workflow::step::Step). Checkpointing, cycle
//! logging and progress reporting are applied around them by the tracker.

mod context;
mod discovery;
mod insight;
mod optimize;
mod router;
mod save;
mod setup;

pub use context::{AnalyzeFilesStep, LoadContextStep};
pub use discovery::{DataCollectionStep, DiscoveryStep};
pub use insight::InsightStep;
pub use optimize::{AdjustmentStep, ReflectionStep};
pub use router::RouterStep;
pub use save::SaveStep;
pub use setup::CampaignSetupStep;

use serde_json::Value;

/// First `max` characters of a value's rendering, with an ellipsis when cut.
pub(crate) fn preview(value: &Value, max: usize) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if text.chars().count() > max {
        let mut cut: String = text.chars().take(max).collect();
        cut.push_str("...");
        cut
    } else {
        text
    }
}
