//! Recording function invoker for testing

use async_lock::RwLock;
use async_trait::async_trait;
use jitp_core::effects::InvocationEffects;
use jitp_core::{HandlerStatus, ServiceError};
use std::sync::Arc;

/// One recorded invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Function name
    pub function: String,
    /// Payload, parsed as JSON
    pub payload: serde_json::Value,
}

#[derive(Debug)]
enum Reply {
    Status(HandlerStatus),
    Raw(Vec<u8>),
    Fail(ServiceError),
}

/// Invoker that records payloads and answers with a canned reply
#[derive(Debug, Clone)]
pub struct RecordingInvoker {
    calls: Arc<RwLock<Vec<Invocation>>>,
    reply: Arc<Reply>,
}

impl RecordingInvoker {
    /// Answer every call with `status`
    pub fn replying(status: HandlerStatus) -> Self {
        Self::with_reply(Reply::Status(status))
    }

    /// Answer every call with raw bytes
    pub fn replying_raw(body: impl Into<Vec<u8>>) -> Self {
        Self::with_reply(Reply::Raw(body.into()))
    }

    /// Fail every call
    pub fn failing(error: ServiceError) -> Self {
        Self::with_reply(Reply::Fail(error))
    }

    fn with_reply(reply: Reply) -> Self {
        Self {
            calls: Arc::new(RwLock::new(Vec::new())),
            reply: Arc::new(reply),
        }
    }

    /// Calls made so far
    pub async fn calls(&self) -> Vec<Invocation> {
        self.calls.read().await.clone()
    }
}

#[async_trait]
impl InvocationEffects for RecordingInvoker {
    async fn invoke(&self, function: &str, payload: Vec<u8>) -> Result<Vec<u8>, ServiceError> {
        let parsed = serde_json::from_slice(&payload).unwrap_or(serde_json::Value::Null);
        self.calls.write().await.push(Invocation {
            function: function.to_string(),
            payload: parsed,
        });

        match self.reply.as_ref() {
            Reply::Status(status) => serde_json::to_vec(status)
                .map_err(|e| ServiceError::other("Invoke", e.to_string())),
            Reply::Raw(body) => Ok(body.clone()),
            Reply::Fail(error) => Err(error.clone()),
        }
    }
}
