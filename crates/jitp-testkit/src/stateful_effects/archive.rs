//! In-memory archive sink for testing

use async_lock::RwLock;
use async_trait::async_trait;
use jitp_core::effects::ArchiveEffects;
use jitp_core::{ServiceError, ServiceErrorKind};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Default)]
struct ArchiveState {
    objects: BTreeMap<String, Vec<u8>>,
    writes: Vec<String>,
    failures: Vec<ServiceErrorKind>,
}

/// Memory archive handler that remembers every write
#[derive(Debug, Clone, Default)]
pub struct MemoryArchive {
    state: Arc<RwLock<ArchiveState>>,
}

impl MemoryArchive {
    /// Create an empty archive
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next write with `kind`
    pub async fn fail_next_write(&self, kind: ServiceErrorKind) {
        self.state.write().await.failures.push(kind);
    }

    /// Stored object, if any
    pub async fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.state.read().await.objects.get(key).cloned()
    }

    /// Stored object parsed as JSON
    pub async fn object_json(&self, key: &str) -> Option<serde_json::Value> {
        self.object(key)
            .await
            .and_then(|body| serde_json::from_slice(&body).ok())
    }

    /// Keys of every successful write, in order, including overwrites
    pub async fn writes(&self) -> Vec<String> {
        self.state.read().await.writes.clone()
    }

    /// Keys currently stored
    pub async fn keys(&self) -> Vec<String> {
        self.state.read().await.objects.keys().cloned().collect()
    }
}

#[async_trait]
impl ArchiveEffects for MemoryArchive {
    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), ServiceError> {
        let mut state = self.state.write().await;
        if !state.failures.is_empty() {
            let kind = state.failures.remove(0);
            return Err(ServiceError::new(kind, "PutObject", "injected fault"));
        }
        state.writes.push(key.to_string());
        state.objects.insert(key.to_string(), body);
        Ok(())
    }
}
