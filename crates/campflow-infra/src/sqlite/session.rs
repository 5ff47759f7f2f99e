//! SQLite session and step-cycle repository implementation.

use campflow_core::repository::session::SessionRepository;
use campflow_types::error::RepositoryError;
use campflow_types::project::{SessionRecord, SessionStatus, StepCycle};
use campflow_types::workflow::Decision;
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, from_json, parse_datetime, query_error, to_json};

/// SQLite-backed implementation of `SessionRepository`.
pub struct SqliteSessionRepository {
    pool: DatabasePool,
}

impl SqliteSessionRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn parse_uuid(column: &str, text: &str) -> Result<Uuid, RepositoryError> {
    text.parse::<Uuid>()
        .map_err(|e| RepositoryError::Query(format!("invalid {column}: {e}")))
}

fn session_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<SessionRecord, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_error)?;
    let project_id: String = row.try_get("project_id").map_err(query_error)?;
    let session_num: i64 = row.try_get("session_num").map_err(query_error)?;
    let status: String = row.try_get("status").map_err(query_error)?;
    let uploaded_files: String = row.try_get("uploaded_files").map_err(query_error)?;
    let decision: Option<String> = row.try_get("decision").map_err(query_error)?;
    let started_at: String = row.try_get("started_at").map_err(query_error)?;
    let completed_at: Option<String> = row.try_get("completed_at").map_err(query_error)?;

    Ok(SessionRecord {
        id: parse_uuid("session id", &id)?,
        project_id: parse_uuid("project id", &project_id)?,
        session_num: session_num as u32,
        status: status.parse().map_err(RepositoryError::Query)?,
        uploaded_files: from_json("uploaded_files", &uploaded_files)?,
        decision: decision
            .as_deref()
            .map(str::parse::<Decision>)
            .transpose()
            .map_err(RepositoryError::Query)?,
        started_at: parse_datetime(&started_at)?,
        completed_at: completed_at.as_deref().map(parse_datetime).transpose()?,
    })
}

fn cycle_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<StepCycle, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_error)?;
    let session_id: String = row.try_get("session_id").map_err(query_error)?;
    let project_id: String = row.try_get("project_id").map_err(query_error)?;
    let cycle_num: i64 = row.try_get("cycle_num").map_err(query_error)?;
    let execution_time_ms: i64 = row.try_get("execution_time_ms").map_err(query_error)?;
    let created_at: String = row.try_get("created_at").map_err(query_error)?;

    Ok(StepCycle {
        id: parse_uuid("cycle id", &id)?,
        session_id: parse_uuid("session id", &session_id)?,
        project_id: parse_uuid("project id", &project_id)?,
        step_name: row.try_get("step_name").map_err(query_error)?,
        cycle_num: cycle_num as u64,
        execution_time_ms: execution_time_ms as u64,
        success: row.try_get("success").map_err(query_error)?,
        error: row.try_get("error").map_err(query_error)?,
        created_at: parse_datetime(&created_at)?,
    })
}

impl SessionRepository for SqliteSessionRepository {
    async fn create_session(&self, session: &SessionRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO sessions (id, project_id, session_num, status, uploaded_files, decision, started_at, completed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(session.id.to_string())
        .bind(session.project_id.to_string())
        .bind(session.session_num as i64)
        .bind(session.status.to_string())
        .bind(to_json(&session.uploaded_files)?)
        .bind(session.decision.map(|d| d.as_str()))
        .bind(format_datetime(&session.started_at))
        .bind(session.completed_at.as_ref().map(format_datetime))
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;
        Ok(())
    }

    async fn complete_session(
        &self,
        id: &Uuid,
        status: SessionStatus,
        decision: Option<Decision>,
    ) -> Result<(), RepositoryError> {
        let done = sqlx::query(
            "UPDATE sessions SET status = ?, decision = ?, completed_at = ? WHERE id = ?",
        )
        .bind(status.to_string())
        .bind(decision.map(|d| d.as_str()))
        .bind(format_datetime(&Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        if done.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn get_session(&self, id: &Uuid) -> Result<Option<SessionRecord>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;
        row.as_ref().map(session_from_row).transpose()
    }

    async fn list_sessions(
        &self,
        project_id: &Uuid,
        limit: u32,
    ) -> Result<Vec<SessionRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM sessions WHERE project_id = ? ORDER BY session_num DESC, started_at DESC LIMIT ?",
        )
        .bind(project_id.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_error)?;
        rows.iter().map(session_from_row).collect()
    }

    async fn log_cycle(&self, cycle: &StepCycle) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO step_cycles (id, session_id, project_id, step_name, cycle_num, execution_time_ms, success, error, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(cycle.id.to_string())
        .bind(cycle.session_id.to_string())
        .bind(cycle.project_id.to_string())
        .bind(&cycle.step_name)
        .bind(cycle.cycle_num as i64)
        .bind(cycle.execution_time_ms as i64)
        .bind(cycle.success)
        .bind(&cycle.error)
        .bind(format_datetime(&cycle.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;
        Ok(())
    }

    async fn list_cycles(&self, session_id: &Uuid) -> Result<Vec<StepCycle>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM step_cycles WHERE session_id = ? ORDER BY cycle_num ASC")
            .bind(session_id.to_string())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;
        rows.iter().map(cycle_from_row).collect()
    }
}
