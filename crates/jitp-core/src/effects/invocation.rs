//! Synchronous invocation of a separately deployed function.

use crate::errors::ServiceError;
use async_trait::async_trait;

/// Request/response call into another deployable unit.
#[async_trait]
pub trait InvocationEffects: Send + Sync {
    /// Invoke `function` with a JSON payload and wait for its JSON reply.
    async fn invoke(&self, function: &str, payload: Vec<u8>) -> Result<Vec<u8>, ServiceError>;
}
