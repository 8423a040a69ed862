//! Blob sink for raw event archival.

use crate::errors::ServiceError;
use async_trait::async_trait;

/// Write-only object sink with overwrite semantics.
#[async_trait]
pub trait ArchiveEffects: Send + Sync {
    /// Store `body` under `key`, replacing any previous object.
    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), ServiceError>;
}
