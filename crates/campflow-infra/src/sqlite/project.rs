//! SQLite project repository implementation.
//!
//! Implements `ProjectRepository` from `campflow-core`. Shared collections
//! live in one JSON object column guarded by `collections_version`; appends
//! either go through `json_insert` in a single statement or through a
//! version-checked replace.

use campflow_core::repository::project::ProjectRepository;
use campflow_types::error::RepositoryError;
use campflow_types::project::{
    ConcurrencyToken, KNOWLEDGE_FACTS, NewProject, OPTIONAL_COLUMNS, ProjectRecord,
    ProjectSnapshot, SchemaCapabilities, VersionedCollection,
};
use campflow_types::workflow::{FlowCheckpoint, Phase};
use chrono::Utc;
use serde_json::Value;
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, from_json, parse_datetime, query_error, to_json};

/// SQLite-backed implementation of `ProjectRepository`.
pub struct SqliteProjectRepository {
    pool: DatabasePool,
}

impl SqliteProjectRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn exists(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        let row = sqlx::query("SELECT 1 FROM projects WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.writer)
            .await
            .map_err(query_error)?;
        Ok(row.is_some())
    }

    async fn fetch_one_where(
        &self,
        column: &str,
        value: String,
    ) -> Result<Option<ProjectRecord>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT * FROM projects WHERE {column} = ?"))
            .bind(value)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => {
                let project_row = ProjectRow::from_row(&row).map_err(query_error)?;
                Ok(Some(project_row.into_record()?))
            }
            None => Ok(None),
        }
    }
}

/// JSON path of one collection inside the `collections` object.
fn collection_path(field: &str) -> String {
    format!("$.\"{field}\"")
}

/// Internal row type for mapping SQLite rows to a `ProjectRecord`.
struct ProjectRow {
    id: String,
    name: String,
    user_id: Option<String>,
    product_description: Option<String>,
    target_budget: Option<f64>,
    phase: String,
    iteration: i64,
    session_count: i64,
    checkpoint: String,
    payload: String,
    knowledge_facts: Option<String>,
    errors: String,
    collections: String,
    collections_version: i64,
    created_at: String,
    updated_at: String,
}

impl ProjectRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            user_id: row.try_get("user_id")?,
            product_description: row.try_get("product_description")?,
            target_budget: row.try_get("target_budget")?,
            phase: row.try_get("phase")?,
            iteration: row.try_get("iteration")?,
            session_count: row.try_get("session_count")?,
            checkpoint: row.try_get("checkpoint")?,
            payload: row.try_get("payload")?,
            // Optional column: absent on stores that predate it.
            knowledge_facts: row.try_get("knowledge_facts").unwrap_or(None),
            errors: row.try_get("errors")?,
            collections: row.try_get("collections")?,
            collections_version: row.try_get("collections_version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_record(self) -> Result<ProjectRecord, RepositoryError> {
        let id = self
            .id
            .parse::<Uuid>()
            .map_err(|e| RepositoryError::Query(format!("invalid project id: {e}")))?;
        let phase: Phase = self.phase.parse().map_err(RepositoryError::Query)?;
        let checkpoint: FlowCheckpoint = from_json("checkpoint", &self.checkpoint)?;

        Ok(ProjectRecord {
            id,
            name: self.name,
            user_id: self.user_id,
            product_description: self.product_description,
            target_budget: self.target_budget,
            phase,
            iteration: self.iteration as u32,
            session_count: self.session_count as u32,
            checkpoint,
            payload: from_json("payload", &self.payload)?,
            knowledge_facts: self
                .knowledge_facts
                .as_deref()
                .map(|text| from_json(KNOWLEDGE_FACTS, text))
                .transpose()?,
            errors: from_json("errors", &self.errors)?,
            collections: from_json("collections", &self.collections)?,
            collections_version: ConcurrencyToken(self.collections_version as u64),
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

impl ProjectRepository for SqliteProjectRepository {
    async fn load(&self, id: &Uuid) -> Result<Option<ProjectRecord>, RepositoryError> {
        self.fetch_one_where("id", id.to_string()).await
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<ProjectRecord>, RepositoryError> {
        self.fetch_one_where("name", name.to_string()).await
    }

    async fn create(&self, project: &NewProject) -> Result<ProjectRecord, RepositoryError> {
        let now = Utc::now();
        let record = ProjectRecord {
            id: Uuid::now_v7(),
            name: project.name.clone(),
            user_id: project.user_id.clone(),
            product_description: project.product_description.clone(),
            target_budget: project.target_budget,
            phase: Phase::Initialized,
            iteration: 0,
            session_count: 0,
            checkpoint: FlowCheckpoint::default(),
            payload: Default::default(),
            knowledge_facts: None,
            errors: Vec::new(),
            collections: Default::default(),
            collections_version: ConcurrencyToken::default(),
            created_at: now,
            updated_at: now,
        };

        let result = sqlx::query(
            "INSERT INTO projects (id, name, user_id, product_description, target_budget, phase, iteration, session_count, checkpoint, payload, errors, collections, collections_version, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, 0, 0, ?, '{}', '[]', '{}', 0, ?, ?)",
        )
        .bind(record.id.to_string())
        .bind(&record.name)
        .bind(&record.user_id)
        .bind(&record.product_description)
        .bind(record.target_budget)
        .bind(record.phase.as_str())
        .bind(to_json(&record.checkpoint)?)
        .bind(format_datetime(&now))
        .bind(format_datetime(&now))
        .execute(&self.pool.writer)
        .await;

        match result {
            Ok(_) => Ok(record),
            Err(sqlx::Error::Database(db_err)) if db_err.message().contains("UNIQUE") => Err(
                RepositoryError::Conflict(format!("project '{}' already exists", project.name)),
            ),
            Err(e) => Err(query_error(e)),
        }
    }

    async fn save(&self, snapshot: &ProjectSnapshot) -> Result<(), RepositoryError> {
        let knowledge_facts = snapshot.knowledge_facts.as_ref().map(to_json).transpose()?;
        let sql = if knowledge_facts.is_some() {
            "UPDATE projects SET phase = ?, iteration = ?, session_count = ?, checkpoint = ?, payload = ?, errors = ?, updated_at = ?, knowledge_facts = ? WHERE id = ?"
        } else {
            "UPDATE projects SET phase = ?, iteration = ?, session_count = ?, checkpoint = ?, payload = ?, errors = ?, updated_at = ? WHERE id = ?"
        };

        let mut query = sqlx::query(sql)
            .bind(snapshot.phase.as_str())
            .bind(snapshot.iteration as i64)
            .bind(snapshot.session_count as i64)
            .bind(to_json(&snapshot.checkpoint)?)
            .bind(to_json(&snapshot.payload)?)
            .bind(to_json(&snapshot.errors)?)
            .bind(format_datetime(&Utc::now()));
        if let Some(facts) = knowledge_facts {
            query = query.bind(facts);
        }

        let result = query
            .bind(snapshot.id.to_string())
            .execute(&self.pool.writer)
            .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => Err(RepositoryError::NotFound),
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.message().contains("no such column") => {
                let column = OPTIONAL_COLUMNS
                    .iter()
                    .find(|c| db_err.message().contains(*c))
                    .copied()
                    .unwrap_or(KNOWLEDGE_FACTS);
                Err(RepositoryError::UnknownColumn(column.to_string()))
            }
            Err(e) => Err(query_error(e)),
        }
    }

    async fn schema_capabilities(&self) -> Result<SchemaCapabilities, RepositoryError> {
        let rows = sqlx::query("PRAGMA table_info(projects)")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        let mut present = Vec::new();
        for row in &rows {
            let name: String = row.try_get("name").map_err(query_error)?;
            if OPTIONAL_COLUMNS.contains(&name.as_str()) {
                present.push(name);
            }
        }
        Ok(SchemaCapabilities::new(present))
    }

    async fn read_collection(
        &self,
        id: &Uuid,
        field: &str,
    ) -> Result<VersionedCollection, RepositoryError> {
        let row = sqlx::query(
            "SELECT COALESCE(json_extract(collections, ?), '[]') AS items, collections_version
             FROM projects WHERE id = ?",
        )
        .bind(collection_path(field))
        .bind(id.to_string())
        .fetch_optional(&self.pool.writer)
        .await
        .map_err(query_error)?
        .ok_or(RepositoryError::NotFound)?;

        let items: String = row.try_get("items").map_err(query_error)?;
        let version: i64 = row.try_get("collections_version").map_err(query_error)?;
        Ok(VersionedCollection {
            items: from_json(field, &items)?,
            version: ConcurrencyToken(version as u64),
        })
    }

    async fn compare_and_swap_collection(
        &self,
        id: &Uuid,
        field: &str,
        items: &[Value],
        expected: ConcurrencyToken,
    ) -> Result<ConcurrencyToken, RepositoryError> {
        let done = sqlx::query(
            "UPDATE projects
             SET collections = json_set(collections, ?, json(?)),
                 collections_version = collections_version + 1,
                 updated_at = ?
             WHERE id = ? AND collections_version = ?",
        )
        .bind(collection_path(field))
        .bind(to_json(items)?)
        .bind(format_datetime(&Utc::now()))
        .bind(id.to_string())
        .bind(expected.0 as i64)
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        if done.rows_affected() == 1 {
            return Ok(expected.next());
        }
        if self.exists(id).await? {
            Err(RepositoryError::ConcurrencyConflict {
                entity_id: *id,
                field: field.to_string(),
                expected: expected.0,
            })
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    async fn atomic_append(
        &self,
        id: &Uuid,
        field: &str,
        item: &Value,
    ) -> Result<Option<ConcurrencyToken>, RepositoryError> {
        let path = collection_path(field);
        let row = sqlx::query(
            "UPDATE projects
             SET collections = json_set(
                     collections, ?1,
                     json_insert(COALESCE(json_extract(collections, ?1), '[]'), '$[#]', json(?2))),
                 collections_version = collections_version + 1,
                 updated_at = ?3
             WHERE id = ?4
             RETURNING collections_version",
        )
        .bind(&path)
        .bind(to_json(item)?)
        .bind(format_datetime(&Utc::now()))
        .bind(id.to_string())
        .fetch_optional(&self.pool.writer)
        .await
        .map_err(query_error)?
        .ok_or(RepositoryError::NotFound)?;

        let version: i64 = row.try_get("collections_version").map_err(query_error)?;
        Ok(Some(ConcurrencyToken(version as u64)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::test_pool;
    use campflow_types::workflow::FlowStatus;
    use serde_json::json;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, SqliteProjectRepository, ProjectRecord) {
        let dir = tempfile::tempdir().unwrap();
        let repo = SqliteProjectRepository::new(test_pool(&dir).await);
        let record = repo
            .create(&NewProject {
                name: "trail-shoes".into(),
                user_id: Some("u-1".into()),
                product_description: Some("trail running shoes".into()),
                target_budget: Some(5000.0),
            })
            .await
            .unwrap();
        (dir, repo, record)
    }

    fn snapshot(record: &ProjectRecord) -> ProjectSnapshot {
        ProjectSnapshot {
            id: record.id,
            phase: Phase::StrategyBuilt,
            iteration: 2,
            session_count: 3,
            checkpoint: FlowCheckpoint {
                flow_status: FlowStatus::InProgress,
                completed_steps: vec!["load_context".into()],
                last_completed_step: Some("load_context".into()),
                ..Default::default()
            },
            payload: [("current_strategy".to_string(), json!({"insights": []}))].into(),
            knowledge_facts: Some(json!({"product_category": {"value": "footwear"}})),
            errors: vec!["router failed: timeout".into()],
        }
    }

    #[tokio::test]
    async fn test_create_and_load() {
        let (_dir, repo, record) = setup().await;

        let loaded = repo.load(&record.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "trail-shoes");
        assert_eq!(loaded.target_budget, Some(5000.0));
        assert_eq!(loaded.phase, Phase::Initialized);
        assert_eq!(loaded.collections_version, ConcurrencyToken(0));
        assert!(loaded.knowledge_facts.is_none());

        let by_name = repo.find_by_name("trail-shoes").await.unwrap().unwrap();
        assert_eq!(by_name.id, record.id);
        assert!(repo.load(&Uuid::now_v7()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_duplicate_name_conflicts() {
        let (_dir, repo, _) = setup().await;
        let err = repo
            .create(&NewProject {
                name: "trail-shoes".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_save_overwrites_snapshot_fields() {
        let (_dir, repo, record) = setup().await;
        repo.save(&snapshot(&record)).await.unwrap();

        let loaded = repo.load(&record.id).await.unwrap().unwrap();
        assert_eq!(loaded.phase, Phase::StrategyBuilt);
        assert_eq!(loaded.iteration, 2);
        assert_eq!(loaded.session_count, 3);
        assert_eq!(loaded.checkpoint.last_completed_step.as_deref(), Some("load_context"));
        assert_eq!(loaded.payload["current_strategy"], json!({"insights": []}));
        assert_eq!(
            loaded.knowledge_facts.unwrap()["product_category"]["value"],
            "footwear"
        );
        assert_eq!(loaded.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_save_unknown_project() {
        let (_dir, repo, record) = setup().await;
        let mut missing = snapshot(&record);
        missing.id = Uuid::now_v7();
        assert!(matches!(repo.save(&missing).await, Err(RepositoryError::NotFound)));
    }

    #[tokio::test]
    async fn test_save_without_optional_column() {
        let (_dir, repo, record) = setup().await;
        sqlx::query("ALTER TABLE projects DROP COLUMN knowledge_facts")
            .execute(&repo.pool.writer)
            .await
            .unwrap();

        let caps = repo.schema_capabilities().await.unwrap();
        assert!(!caps.supports(KNOWLEDGE_FACTS));

        let err = repo.save(&snapshot(&record)).await.unwrap_err();
        assert!(matches!(err, RepositoryError::UnknownColumn(ref c) if c == KNOWLEDGE_FACTS));

        repo.save(&snapshot(&record).without_field(KNOWLEDGE_FACTS))
            .await
            .unwrap();
        let loaded = repo.load(&record.id).await.unwrap().unwrap();
        assert_eq!(loaded.iteration, 2);
        assert!(loaded.knowledge_facts.is_none());
    }

    #[tokio::test]
    async fn test_schema_capabilities_after_migrations() {
        let (_dir, repo, _) = setup().await;
        let caps = repo.schema_capabilities().await.unwrap();
        assert!(caps.supports(KNOWLEDGE_FACTS));
        assert!(caps.missing().is_empty());
    }

    #[tokio::test]
    async fn test_compare_and_swap_detects_stale_version() {
        let (_dir, repo, record) = setup().await;

        let read = repo.read_collection(&record.id, "config_history").await.unwrap();
        assert!(read.items.is_empty());
        assert_eq!(read.version, ConcurrencyToken(0));

        let next = repo
            .compare_and_swap_collection(&record.id, "config_history", &[json!({"v": 1})], read.version)
            .await
            .unwrap();
        assert_eq!(next, ConcurrencyToken(1));

        let err = repo
            .compare_and_swap_collection(&record.id, "config_history", &[json!({"v": 2})], read.version)
            .await
            .unwrap_err();
        assert!(err.is_concurrency_conflict());

        let read = repo.read_collection(&record.id, "config_history").await.unwrap();
        assert_eq!(read.items, vec![json!({"v": 1})]);
        assert_eq!(read.version, ConcurrencyToken(1));
    }

    #[tokio::test]
    async fn test_atomic_append_creates_and_extends() {
        let (_dir, repo, record) = setup().await;

        let first = repo
            .atomic_append(&record.id, "metrics_timeline", &json!({"iteration": 1}))
            .await
            .unwrap();
        let second = repo
            .atomic_append(&record.id, "metrics_timeline", &json!({"iteration": 2}))
            .await
            .unwrap();
        assert_eq!(first, Some(ConcurrencyToken(1)));
        assert_eq!(second, Some(ConcurrencyToken(2)));

        let read = repo.read_collection(&record.id, "metrics_timeline").await.unwrap();
        assert_eq!(read.items, vec![json!({"iteration": 1}), json!({"iteration": 2})]);

        // Saves never touch collections.
        repo.save(&snapshot(&record)).await.unwrap();
        let loaded = repo.load(&record.id).await.unwrap().unwrap();
        assert_eq!(loaded.collections["metrics_timeline"].len(), 2);
    }

    #[tokio::test]
    async fn test_collections_on_missing_project() {
        let (_dir, repo, _) = setup().await;
        let id = Uuid::now_v7();
        assert!(matches!(
            repo.read_collection(&id, "config_history").await,
            Err(RepositoryError::NotFound)
        ));
        assert!(matches!(
            repo.atomic_append(&id, "config_history", &json!(1)).await,
            Err(RepositoryError::NotFound)
        ));
        assert!(matches!(
            repo.compare_and_swap_collection(&id, "config_history", &[], ConcurrencyToken(0))
                .await,
            Err(RepositoryError::NotFound)
        ));
    }
}
