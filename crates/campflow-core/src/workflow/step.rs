//! Step contract: a named async unit of work over the shared workflow state.

use campflow_types::error::{CallError, RepositoryError};
use campflow_types::workflow::{TransitionError, WorkflowState};
use futures_util::future::BoxFuture;

use super::concurrency::GuardError;
use super::retry::RetryError;

// ---------------------------------------------------------------------------
// Step trait
// ---------------------------------------------------------------------------

/// A named processing step.
///
/// Object-safe so graphs can hold heterogeneous steps behind `Arc<dyn Step>`.
pub trait Step: Send + Sync {
    fn name(&self) -> &str;

    fn run<'a>(&'a self, state: &'a mut WorkflowState) -> BoxFuture<'a, Result<(), StepError>>;
}

/// Adapter for synchronous step bodies.
pub struct FnStep<F> {
    name: String,
    body: F,
}

impl<F> FnStep<F>
where
    F: Fn(&mut WorkflowState) -> Result<(), StepError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, body: F) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }
}

impl<F> Step for FnStep<F>
where
    F: Fn(&mut WorkflowState) -> Result<(), StepError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run<'a>(&'a self, state: &'a mut WorkflowState) -> BoxFuture<'a, Result<(), StepError>> {
        let result = (self.body)(state);
        Box::pin(async move { result })
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors a step body can return.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// An external call failed without retry.
    #[error("call failed: {0}")]
    Call(#[from] CallError),

    /// An external call failed after the retry wrapper gave up.
    #[error(transparent)]
    Retry(#[from] RetryError<CallError>),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Appending to a shared collection failed.
    #[error(transparent)]
    Guard(#[from] GuardError),

    /// The checkpoint rejected a status change.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("validation failed: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_fn_step_runs_body() {
        let step = FnStep::new("mark", |state: &mut WorkflowState| {
            state.push_message("marked");
            Ok(())
        });
        let mut state = WorkflowState::new(Uuid::nil(), vec![]);
        step.run(&mut state).await.unwrap();
        assert_eq!(step.name(), "mark");
        assert_eq!(state.messages, vec!["marked"]);
    }

    #[test]
    fn test_step_error_display() {
        let err = StepError::Validation("missing strategy".into());
        assert_eq!(err.to_string(), "validation failed: missing strategy");

        let err = StepError::from(CallError::Gateway(503));
        assert!(err.to_string().contains("503"));
    }
}
