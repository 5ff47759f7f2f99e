//! Read-only lookup contract used by discovery fan-out.

use campflow_types::error::CallError;
use futures_util::future::BoxFuture;
use serde_json::Value;

/// A search backend. Results are opaque JSON documents.
pub trait Lookup: Send + Sync {
    fn name(&self) -> &str;

    fn search<'a>(
        &'a self,
        query: &'a str,
        max_results: usize,
    ) -> BoxFuture<'a, Result<Vec<Value>, CallError>>;
}
