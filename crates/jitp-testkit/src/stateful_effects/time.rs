//! Controllable clock for testing

use async_trait::async_trait;
use jitp_core::effects::PhysicalTimeEffects;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Clock that only moves when told to
#[derive(Debug, Clone, Default)]
pub struct FixedClock {
    now_ms: Arc<AtomicU64>,
}

impl FixedClock {
    /// Clock frozen at `now_ms`
    pub fn at(now_ms: u64) -> Self {
        Self {
            now_ms: Arc::new(AtomicU64::new(now_ms)),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }
}

#[async_trait]
impl PhysicalTimeEffects for FixedClock {
    async fn physical_time_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}
