//! Filesystem archive sink
//!
//! Stores each object as a file under `<root>/<bucket>/<key>`. Overwrites
//! replace the previous file. Stateless; no mock handlers here, those belong
//! in `jitp-testkit`.

use async_trait::async_trait;
use jitp_core::effects::ArchiveEffects;
use jitp_core::ServiceError;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

const OPERATION: &str = "PutObject";

/// Filesystem-backed archive handler
#[derive(Debug, Clone)]
pub struct FilesystemArchiveHandler {
    bucket_path: PathBuf,
}

impl FilesystemArchiveHandler {
    /// Archive into `bucket` below `root`
    pub fn new(root: impl Into<PathBuf>, bucket: &str) -> Self {
        Self {
            bucket_path: root.into().join(bucket),
        }
    }

    /// Directory objects are written below
    pub fn bucket_path(&self) -> &Path {
        &self.bucket_path
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, ServiceError> {
        let relative = Path::new(key);
        let escapes = key.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(ServiceError::other(
                OPERATION,
                format!("invalid object key '{key}'"),
            ));
        }
        Ok(self.bucket_path.join(relative))
    }
}

#[async_trait]
impl ArchiveEffects for FilesystemArchiveHandler {
    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), ServiceError> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                ServiceError::other(OPERATION, format!("failed to create directory: {e}"))
            })?;
        }

        fs::write(&path, body)
            .await
            .map_err(|e| ServiceError::other(OPERATION, format!("failed to write {key}: {e}")))?;

        tracing::trace!(path = %path.display(), "object written");
        Ok(())
    }
}
