//! Session repository trait definition.
//!
//! One session row per workflow invocation, plus a cycle row for every
//! executed step.

use campflow_types::error::RepositoryError;
use campflow_types::project::{SessionRecord, SessionStatus, StepCycle};
use campflow_types::workflow::Decision;
use uuid::Uuid;

/// Repository trait for sessions and their step cycles.
pub trait SessionRepository: Send + Sync {
    fn create_session(
        &self,
        session: &SessionRecord,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Mark a session finished with its final status and routing decision.
    fn complete_session(
        &self,
        id: &Uuid,
        status: SessionStatus,
        decision: Option<Decision>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get_session(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<SessionRecord>, RepositoryError>> + Send;

    /// Sessions of a project, most recent first.
    fn list_sessions(
        &self,
        project_id: &Uuid,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<SessionRecord>, RepositoryError>> + Send;

    fn log_cycle(
        &self,
        cycle: &StepCycle,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Cycles of a session in execution order.
    fn list_cycles(
        &self,
        session_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<StepCycle>, RepositoryError>> + Send;
}
