//! Wall-clock access.

use async_trait::async_trait;

/// Wall-clock time, used only to build archive keys for telemetry.
#[async_trait]
pub trait PhysicalTimeEffects: Send + Sync {
    /// Milliseconds since the Unix epoch.
    async fn physical_time_ms(&self) -> u64;
}
