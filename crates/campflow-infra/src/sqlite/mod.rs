//! SQLite storage layer.
//!
//! Repository implementations backed by SQLite with WAL mode and split
//! read/write connection pools. JSON-valued fields are stored as TEXT.

pub mod artifact_cache;
pub mod pool;
pub mod project;
pub mod session;

use campflow_types::error::RepositoryError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|e| RepositoryError::Query(e.to_string()))
}

fn from_json<T: DeserializeOwned>(column: &str, text: &str) -> Result<T, RepositoryError> {
    serde_json::from_str(text)
        .map_err(|e| RepositoryError::Query(format!("invalid {column} JSON: {e}")))
}

fn query_error(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

/// Fresh migrated database inside `dir`.
#[cfg(test)]
pub(crate) async fn test_pool(dir: &tempfile::TempDir) -> pool::DatabasePool {
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
    pool::DatabasePool::new(&url).await.unwrap()
}
