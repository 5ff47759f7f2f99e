//! Optimistic concurrency guard for shared append-only collections.
//!
//! Appends go through the store's atomic server-side append when it has one.
//! Otherwise the guard reads the collection with its version, appends locally
//! and writes back with a compare-and-swap on that version, re-reading on
//! conflict within the configured retry budget.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use campflow_types::error::RepositoryError;
use campflow_types::project::ConcurrencyToken;
use campflow_types::workflow::WorkflowState;
use serde_json::Value;
use uuid::Uuid;

use crate::repository::project::ProjectRepository;

use super::retry::{RetryError, RetryPolicy, retry_with_backoff};

/// Result of a successful append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    /// Collection version after the write.
    pub version: ConcurrencyToken,
    /// Conflicting attempts that were retried.
    pub conflicts: u32,
    /// Whether the atomic server-side path was used.
    pub atomic: bool,
}

/// Serialises appends to a project's shared collections across processes.
pub struct CollectionGuard<P: ProjectRepository> {
    repo: Arc<P>,
    policy: RetryPolicy,
    prefer_atomic: bool,
}

impl<P: ProjectRepository> CollectionGuard<P> {
    pub fn new(repo: Arc<P>, policy: RetryPolicy, prefer_atomic: bool) -> Self {
        Self {
            repo,
            policy,
            prefer_atomic,
        }
    }

    /// Append `item` to `field` of `project_id`.
    pub async fn append(
        &self,
        project_id: Uuid,
        field: &str,
        item: &Value,
    ) -> Result<AppendOutcome, GuardError> {
        if self.prefer_atomic {
            if let Some(version) = self.repo.atomic_append(&project_id, field, item).await? {
                tracing::debug!(
                    project_id = %project_id,
                    field,
                    version = %version,
                    "atomic append"
                );
                return Ok(AppendOutcome {
                    version,
                    conflicts: 0,
                    atomic: true,
                });
            }
            tracing::debug!(field, "store has no atomic append, using compare-and-swap");
        }

        let conflicts = AtomicU32::new(0);
        let on_conflict = |error: &RepositoryError, attempt: u32| {
            conflicts.fetch_add(1, Ordering::SeqCst);
            tracing::warn!(
                project_id = %project_id,
                field,
                attempt = attempt + 1,
                error = %error,
                "concurrency conflict on shared collection, re-reading"
            );
        };
        let on_retry: &(dyn Fn(&RepositoryError, u32) + Send + Sync) = &on_conflict;

        let repo = &self.repo;
        let label = format!("append {field}");
        let result = retry_with_backoff(
            &self.policy,
            &label,
            RepositoryError::is_concurrency_conflict,
            Some(on_retry),
            |_attempt| async move {
                let current = repo.read_collection(&project_id, field).await?;
                let mut items = current.items;
                items.push(item.clone());
                repo.compare_and_swap_collection(&project_id, field, &items, current.version)
                    .await
            },
        )
        .await;

        match result {
            Ok(version) => {
                tracing::debug!(
                    project_id = %project_id,
                    field,
                    version = %version,
                    "compare-and-swap append"
                );
                Ok(AppendOutcome {
                    version,
                    conflicts: conflicts.load(Ordering::SeqCst),
                    atomic: false,
                })
            }
            Err(RetryError::Exhausted { attempts, .. }) => {
                tracing::error!(
                    project_id = %project_id,
                    field,
                    attempts,
                    "giving up on shared collection append"
                );
                Err(GuardError::Exhausted {
                    field: field.to_string(),
                    attempts,
                })
            }
            Err(RetryError::Fatal(error)) => Err(GuardError::Repository(error)),
        }
    }

    /// Append through the guard and mirror the item into the state's read view.
    pub async fn append_to_state(
        &self,
        state: &mut WorkflowState,
        field: &str,
        item: Value,
    ) -> Result<AppendOutcome, GuardError> {
        let outcome = self.append(state.project_id, field, &item).await?;
        state
            .collections
            .entry(field.to_string())
            .or_default()
            .push(item);
        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from guarded appends.
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Every attempt lost the race to another writer.
    #[error("append to '{field}' abandoned after {attempts} conflicting attempts")]
    Exhausted { field: String, attempts: u32 },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
