//! Archival of device telemetry and raw uploads, keyed by arrival time.

use crate::archival::{device_data_key, upload_key, EventArchiver};
use jitp_core::effects::{ArchiveEffects, PhysicalTimeEffects};
use jitp_core::types::DeviceDataMessage;
use jitp_core::{DeviceId, JitpResult};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// Writes telemetry payloads to the archive.
pub struct TelemetryArchiver<A, T> {
    archiver: EventArchiver<A>,
    clock: Arc<T>,
}

impl<A: ArchiveEffects, T: PhysicalTimeEffects> TelemetryArchiver<A, T> {
    /// Archive into `archive`, timestamping with `clock`
    pub fn new(archive: Arc<A>, clock: Arc<T>) -> Self {
        Self {
            archiver: EventArchiver::new(archive),
            clock,
        }
    }

    /// Archive a device message under `devices/<deviceId>/<ms>.json`.
    pub async fn device_data(&self, payload: &Value) -> JitpResult<(DeviceId, String)> {
        let message = DeviceDataMessage::from_value(payload)?;
        let now_ms = self.clock.physical_time_ms().await;
        let key = self
            .archiver
            .archive(device_data_key(&message.device_id, now_ms), payload)
            .await?;
        info!(device = %message.device_id, key = %key, "stored device data");
        Ok((message.device_id, key))
    }

    /// Archive any payload under `uploads/<ms>.json`.
    pub async fn upload(&self, payload: &Value) -> JitpResult<String> {
        let now_ms = self.clock.physical_time_ms().await;
        let key = self.archiver.archive(upload_key(now_ms), payload).await?;
        info!(key = %key, "stored upload");
        Ok(key)
    }
}
