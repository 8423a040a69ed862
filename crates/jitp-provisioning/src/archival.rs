//! Raw event archival.

use jitp_core::effects::ArchiveEffects;
use jitp_core::{CertificateId, DeviceId, JitpResult};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Key of the onboarding record for a certificate.
pub fn first_connection_key(certificate: &CertificateId) -> String {
    format!("firstconnection/{certificate}")
}

/// Key of one telemetry message.
pub fn device_data_key(device: &DeviceId, now_ms: u64) -> String {
    format!("devices/{device}/{now_ms}.json")
}

/// Key of one raw upload.
pub fn upload_key(now_ms: u64) -> String {
    format!("uploads/{now_ms}.json")
}

/// Writes raw trigger payloads to the archive sink.
#[derive(Debug)]
pub struct EventArchiver<A> {
    archive: Arc<A>,
}

impl<A> Clone for EventArchiver<A> {
    fn clone(&self) -> Self {
        Self {
            archive: Arc::clone(&self.archive),
        }
    }
}

impl<A: ArchiveEffects> EventArchiver<A> {
    /// Archive into `archive`
    pub fn new(archive: Arc<A>) -> Self {
        Self { archive }
    }

    /// Store `payload` as JSON under `key`, overwriting any previous object.
    pub async fn archive(&self, key: String, payload: &Value) -> JitpResult<String> {
        let body = serde_json::to_vec(payload)?;
        let size = body.len();
        self.archive.put_object(&key, body).await?;
        debug!(key = %key, bytes = size, "archived event");
        Ok(key)
    }
}
