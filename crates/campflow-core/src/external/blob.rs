//! Blob storage contract for uploaded artifacts.

use campflow_types::error::CallError;
use futures_util::future::BoxFuture;

/// Upload and download artifacts by storage path.
pub trait BlobStore: Send + Sync {
    /// Store `bytes` and return the storage path (also the artifact cache key).
    fn upload<'a>(
        &'a self,
        project_id: &'a str,
        file_name: &'a str,
        bytes: &'a [u8],
    ) -> BoxFuture<'a, Result<String, CallError>>;

    fn download<'a>(&'a self, storage_path: &'a str) -> BoxFuture<'a, Result<Vec<u8>, CallError>>;
}
