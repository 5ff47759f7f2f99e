//! Local-disk blob store for uploaded artifacts.
//!
//! Storage paths are content-addressed: `projects/{project_id}/{hash}-{file}`
//! where `hash` is the first 16 hex chars of the SHA-256 of the bytes.
//! Re-uploading identical content yields the same path, which keeps the
//! artifact cache warm across sessions.

use std::path::{Component, Path, PathBuf};

use campflow_core::external::blob::BlobStore;
use campflow_types::error::CallError;
use futures_util::future::BoxFuture;
use sha2::{Digest, Sha256};

const HASH_PREFIX_CHARS: usize = 16;

/// Blob store rooted at a directory, normally `{data_dir}/blobs`.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Storage path for `bytes` uploaded as `file_name` under `project_id`.
    pub fn storage_path(project_id: &str, file_name: &str, bytes: &[u8]) -> String {
        let digest = format!("{:x}", Sha256::digest(bytes));
        let base = Path::new(file_name)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("artifact");
        format!("projects/{project_id}/{}-{base}", &digest[..HASH_PREFIX_CHARS])
    }

    /// Resolve a storage path under the root, rejecting anything that escapes it.
    fn resolve(&self, storage_path: &str) -> Result<PathBuf, CallError> {
        let relative = Path::new(storage_path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes || storage_path.is_empty() {
            return Err(CallError::InvalidConfig(format!(
                "invalid storage path: {storage_path}"
            )));
        }
        Ok(self.root.join(relative))
    }
}

fn io_error(path: &Path, err: std::io::Error) -> CallError {
    CallError::Other(format!("{}: {err}", path.display()))
}

impl BlobStore for LocalBlobStore {
    fn upload<'a>(
        &'a self,
        project_id: &'a str,
        file_name: &'a str,
        bytes: &'a [u8],
    ) -> BoxFuture<'a, Result<String, CallError>> {
        Box::pin(async move {
            let storage_path = Self::storage_path(project_id, file_name, bytes);
            let path = self.resolve(&storage_path)?;

            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                tracing::debug!(%storage_path, "blob already stored");
                return Ok(storage_path);
            }
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| io_error(parent, e))?;
            }
            tokio::fs::write(&path, bytes)
                .await
                .map_err(|e| io_error(&path, e))?;

            tracing::debug!(%storage_path, size = bytes.len(), "blob uploaded");
            Ok(storage_path)
        })
    }

    fn download<'a>(&'a self, storage_path: &'a str) -> BoxFuture<'a, Result<Vec<u8>, CallError>> {
        Box::pin(async move {
            let path = self.resolve(storage_path)?;
            match tokio::fs::read(&path).await {
                Ok(bytes) => Ok(bytes),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(CallError::Other(
                    format!("artifact not found: {storage_path}"),
                )),
                Err(e) => Err(io_error(&path, e)),
            }
        })
    }
}
