//! System clock handler

use async_trait::async_trait;
use jitp_core::effects::PhysicalTimeEffects;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Wall-clock time from the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeHandler;

impl SystemTimeHandler {
    /// Create a new system time handler
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PhysicalTimeEffects for SystemTimeHandler {
    async fn physical_time_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_millis() as u64
    }
}
