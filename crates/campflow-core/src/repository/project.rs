//! Project repository trait definition.
//!
//! Defines the storage interface for project records: full-snapshot saves for
//! the checkpoint and payload, and versioned access to the shared append-only
//! collections. The infrastructure layer (campflow-infra) implements this trait
//! with SQLite persistence.

use campflow_types::error::RepositoryError;
use campflow_types::project::{
    ConcurrencyToken, NewProject, ProjectRecord, ProjectSnapshot, SchemaCapabilities,
    VersionedCollection,
};
use serde_json::Value;
use uuid::Uuid;

/// Repository trait for project persistence.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait ProjectRepository: Send + Sync {
    /// Load a project by ID.
    fn load(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<ProjectRecord>, RepositoryError>> + Send;

    /// Load a project by its unique name.
    fn find_by_name(
        &self,
        name: &str,
    ) -> impl std::future::Future<Output = Result<Option<ProjectRecord>, RepositoryError>> + Send;

    /// Create a project. Fails with `Conflict` if the name is taken.
    fn create(
        &self,
        project: &NewProject,
    ) -> impl std::future::Future<Output = Result<ProjectRecord, RepositoryError>> + Send;

    /// Overwrite the project's checkpoint, payload and error log.
    ///
    /// Shared collections are never touched. Returns `UnknownColumn` when the
    /// snapshot carries an optional field the schema lacks.
    fn save(
        &self,
        snapshot: &ProjectSnapshot,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Optional columns present in the store.
    fn schema_capabilities(
        &self,
    ) -> impl std::future::Future<Output = Result<SchemaCapabilities, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Shared collections
    // -----------------------------------------------------------------------

    /// Read one collection together with the current version.
    fn read_collection(
        &self,
        id: &Uuid,
        field: &str,
    ) -> impl std::future::Future<Output = Result<VersionedCollection, RepositoryError>> + Send;

    /// Replace a collection only if the version still equals `expected`.
    ///
    /// Returns the new version, or `ConcurrencyConflict` on mismatch.
    fn compare_and_swap_collection(
        &self,
        id: &Uuid,
        field: &str,
        items: &[Value],
        expected: ConcurrencyToken,
    ) -> impl std::future::Future<Output = Result<ConcurrencyToken, RepositoryError>> + Send;

    /// Server-side append in a single statement.
    ///
    /// Returns `Ok(None)` when the store has no atomic append.
    fn atomic_append(
        &self,
        id: &Uuid,
        field: &str,
        item: &Value,
    ) -> impl std::future::Future<Output = Result<Option<ConcurrencyToken>, RepositoryError>> + Send;
}
