//! `save`: the terminal step.
//!
//! Persistence itself happens in the checkpoint tracker after every step;
//! this step only marks the end of the flow.

use campflow_types::workflow::WorkflowState;
use futures_util::future::BoxFuture;

use crate::campaign::SAVE;
use crate::workflow::step::{Step, StepError};

pub struct SaveStep;

impl Step for SaveStep {
    fn name(&self) -> &str {
        SAVE
    }

    fn run<'a>(&'a self, state: &'a mut WorkflowState) -> BoxFuture<'a, Result<(), StepError>> {
        tracing::debug!(project_id = %state.project_id, phase = %state.current_phase, "flow reached save");
        state.push_message("State saved");
        Box::pin(async { Ok(()) })
    }
}
