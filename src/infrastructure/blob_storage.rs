// Blob storage - opaque files addressed by path, exposed through public URLs

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use crate::error::{AppError, AppResult};

#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Writes the object, replacing any previous content at `path`.
    async fn upload(&self, path: &str, bytes: &[u8]) -> AppResult<()>;
    async fn download_url(&self, path: &str) -> AppResult<String>;
    /// Accepts either an object path or a URL previously returned by `download_url`.
    /// Returns false when nothing was stored there.
    async fn delete(&self, reference: &str) -> AppResult<bool>;
    /// Object path behind a path or URL, rejecting anything outside this store.
    fn object_path(&self, reference: &str) -> AppResult<String>;
}

/// Filesystem-backed storage; objects are served by the HTTP layer under `public_base_url`
pub struct LocalBlobStorage {
    root: PathBuf,
    public_base_url: String,
}

impl LocalBlobStorage {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_path(&self, object_path: &str) -> PathBuf {
        self.root.join(object_path)
    }
}

#[async_trait]
impl BlobStorage for LocalBlobStorage {
    async fn upload(&self, path: &str, bytes: &[u8]) -> AppResult<()> {
        let object_path = self.object_path(path)?;
        let file_path = self.file_path(&object_path);
        if let Some(parent) = file_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                AppError::Storage(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }
        tokio::fs::write(&file_path, bytes)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to write {}: {}", object_path, e)))?;
        debug!("Stored {} ({} bytes)", object_path, bytes.len());
        Ok(())
    }

    async fn download_url(&self, path: &str) -> AppResult<String> {
        let object_path = self.object_path(path)?;
        match tokio::fs::metadata(self.file_path(&object_path)).await {
            Ok(_) => Ok(format!("{}/{}", self.public_base_url, object_path)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(AppError::NotFound(format!(
                "Object {} does not exist",
                object_path
            ))),
            Err(e) => Err(AppError::Storage(format!("Failed to stat {}: {}", object_path, e))),
        }
    }

    async fn delete(&self, reference: &str) -> AppResult<bool> {
        let object_path = self.object_path(reference)?;
        match tokio::fs::remove_file(self.file_path(&object_path)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AppError::Storage(format!("Failed to delete {}: {}", object_path, e))),
        }
    }

    fn object_path(&self, reference: &str) -> AppResult<String> {
        let path = reference
            .strip_prefix(&self.public_base_url)
            .unwrap_or(reference)
            .trim_start_matches('/');

        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if path.is_empty() || escapes {
            return Err(AppError::BadRequest(format!("Invalid object path: {}", reference)));
        }
        Ok(path.to_string())
    }
}
