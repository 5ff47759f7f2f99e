//! Ads-platform publishing contract.

use campflow_types::error::CallError;
use futures_util::future::BoxFuture;
use serde_json::Value;

/// Publishes a campaign configuration to an ads platform.
///
/// Implementations report throttling as [`CallError::RateLimited`]; callers
/// wrap `publish` in [`RateLimitBackoff`](crate::workflow::retry::RateLimitBackoff).
pub trait CampaignPublisher: Send + Sync {
    fn name(&self) -> &str;

    fn publish<'a>(&'a self, config: &'a Value) -> BoxFuture<'a, Result<Value, CallError>>;
}
