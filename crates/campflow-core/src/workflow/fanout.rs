//! Bounded fan-out of independent external calls.
//!
//! Every call is joined; a failing call never aborts its siblings. Results come
//! back in submission order.

use std::future::Future;
use std::sync::Arc;

use campflow_types::error::CallError;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Successes and failures of one fan-out, each keyed by the caller's label.
#[derive(Debug)]
pub struct FanOutResult<K, T> {
    pub succeeded: Vec<(K, T)>,
    pub failed: Vec<(K, CallError)>,
}

impl<K, T> Default for FanOutResult<K, T> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }
}

/// Run `calls` with at most `workers` in flight at once.
pub async fn fan_out<K, T, F>(workers: usize, calls: Vec<(K, F)>) -> FanOutResult<K, T>
where
    K: Send + 'static,
    T: Send + 'static,
    F: Future<Output = Result<T, CallError>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut join_set = JoinSet::new();

    for (index, (key, call)) in calls.into_iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        join_set.spawn(async move {
            let result = match semaphore.acquire_owned().await {
                Ok(_permit) => call.await,
                Err(_) => Err(CallError::Other("fan-out pool closed".to_string())),
            };
            (index, key, result)
        });
    }

    let mut succeeded = Vec::new();
    let mut failed = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((index, key, Ok(value))) => succeeded.push((index, key, value)),
            Ok((index, key, Err(error))) => {
                tracing::warn!(index, error = %error, "fan-out call failed");
                failed.push((index, key, error));
            }
            Err(join_error) => {
                tracing::error!(error = %join_error, "fan-out task panicked");
            }
        }
    }

    succeeded.sort_by_key(|(index, _, _)| *index);
    failed.sort_by_key(|(index, _, _)| *index);

    FanOutResult {
        succeeded: succeeded.into_iter().map(|(_, k, v)| (k, v)).collect(),
        failed: failed.into_iter().map(|(_, k, e)| (k, e)).collect(),
    }
}
