//! Session preparation: hydrate the project, decide between resuming and
//! starting fresh, and open a session row.

use campflow_types::error::RepositoryError;
use campflow_types::project::{SessionRecord, SessionStatus};
use campflow_types::workflow::{FlowStatus, WorkflowState};
use chrono::Utc;
use uuid::Uuid;

use crate::repository::project::ProjectRepository;
use crate::repository::session::SessionRepository;

const BANNER: &str = "============================================================";

/// How the new session relates to the persisted flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStart {
    /// First flow on this project, or the previous one had not started.
    Fresh,
    /// Continue an interrupted flow after its last completed step.
    Resume,
    /// The previous flow completed; a new one starts at the entry step.
    NextFlow,
    /// Caller asked to discard the interrupted flow.
    ForcedRestart,
}

/// Load the project into `state`, detect resumption, and create the session row.
///
/// `state.flow.force_restart` is read from the caller and survives hydration.
pub async fn prepare_session<P, S>(
    projects: &P,
    sessions: &S,
    state: &mut WorkflowState,
) -> Result<SessionStart, RepositoryError>
where
    P: ProjectRepository,
    S: SessionRepository,
{
    let record = projects
        .load(&state.project_id)
        .await?
        .ok_or(RepositoryError::NotFound)?;
    state.hydrate(&record);

    let start = detect_start(state);
    tracing::info!(
        project_id = %state.project_id,
        session_num = state.session_num,
        ?start,
        "session prepared"
    );

    let session = SessionRecord {
        id: Uuid::now_v7(),
        project_id: state.project_id,
        session_num: state.session_num,
        status: SessionStatus::Running,
        uploaded_files: state.uploaded_files.clone(),
        decision: None,
        started_at: Utc::now(),
        completed_at: None,
    };
    sessions.create_session(&session).await?;
    state.session_id = Some(session.id);

    Ok(start)
}

/// Mark the session finished with the flow's outcome and routing decision.
pub async fn finish_session<S: SessionRepository>(
    sessions: &S,
    state: &WorkflowState,
) -> Result<(), RepositoryError> {
    let Some(session_id) = state.session_id else {
        return Ok(());
    };
    let status = match state.flow.flow_status {
        FlowStatus::Completed => SessionStatus::Completed,
        _ => SessionStatus::Failed,
    };
    let decision = state.decision.as_ref().map(|d| d.decision);
    sessions.complete_session(&session_id, status, decision).await?;
    tracing::debug!(session_id = %session_id, %status, "session closed");
    Ok(())
}

fn detect_start(state: &mut WorkflowState) -> SessionStart {
    let flow = &state.flow;

    if flow.force_restart {
        state.flow.reset();
        state.push_message("Force restart requested - starting fresh flow");
        return SessionStart::ForcedRestart;
    }

    if flow.can_resume() {
        let last = flow.last_completed_step.clone().unwrap_or_default();
        let completed = flow.completed_steps.join(", ");
        let failed = flow.flow_status == FlowStatus::Failed;
        state.flow.is_resuming = true;

        state.push_message(BANNER);
        if failed {
            state.push_message("PREVIOUS FLOW FAILED - RESUMING");
            state.push_message(BANNER);
            state.push_message(format!("Last completed step before failure: {last}"));
            state.push_message(format!("Retrying from next step after: {last}"));
        } else {
            state.push_message("RESUMING FROM CHECKPOINT");
            state.push_message(BANNER);
            state.push_message(format!("Last completed step: {last}"));
            state.push_message(format!("Completed steps: [{completed}]"));
        }
        state.push_message(BANNER);
        return SessionStart::Resume;
    }

    let previous = flow.flow_status;
    state.flow.reset();
    if previous == FlowStatus::Completed {
        state.push_message("Previous flow completed - starting new session");
        SessionStart::NextFlow
    } else {
        SessionStart::Fresh
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
