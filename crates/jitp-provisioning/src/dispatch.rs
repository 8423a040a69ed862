//! How the orchestrator gets a device record created.
//!
//! Either in process, through [`DeviceRecordProvisioner`], or by invoking a
//! separately deployed function with a [`ThingCreationRequest`] and waiting
//! for its status reply.

use crate::device_record::DeviceRecordProvisioner;
use async_trait::async_trait;
use jitp_core::effects::{InvocationEffects, ThingRegistryEffects};
use jitp_core::types::ThingCreationRequest;
use jitp_core::{HandlerStatus, JitpError, JitpResult, ServiceError};
use std::sync::Arc;
use tracing::debug;

/// Record creation seam used by the activation workflow.
#[async_trait]
pub trait RecordDispatch: Send + Sync {
    /// Ensure the record exists with the principal bound.
    async fn dispatch(&self, request: &ThingCreationRequest) -> JitpResult<()>;
}

/// Provision records in process.
#[derive(Debug, Clone)]
pub struct InlineDispatch<R> {
    provisioner: DeviceRecordProvisioner<R>,
}

impl<R: ThingRegistryEffects> InlineDispatch<R> {
    /// Dispatch straight to a registry
    pub fn new(registry: Arc<R>) -> Self {
        Self {
            provisioner: DeviceRecordProvisioner::new(registry),
        }
    }
}

#[async_trait]
impl<R: ThingRegistryEffects> RecordDispatch for InlineDispatch<R> {
    async fn dispatch(&self, request: &ThingCreationRequest) -> JitpResult<()> {
        self.provisioner
            .provision(&request.device_id, &request.certificate_arn)
            .await
    }
}

/// Provision records by invoking a named function.
#[derive(Debug, Clone)]
pub struct InvocationDispatch<I> {
    invoker: Arc<I>,
    function: String,
}

impl<I: InvocationEffects> InvocationDispatch<I> {
    /// Dispatch to `function` through `invoker`
    pub fn new(invoker: Arc<I>, function: impl Into<String>) -> Self {
        Self {
            invoker,
            function: function.into(),
        }
    }

    /// Name of the target function
    pub fn function(&self) -> &str {
        &self.function
    }
}

#[async_trait]
impl<I: InvocationEffects> RecordDispatch for InvocationDispatch<I> {
    async fn dispatch(&self, request: &ThingCreationRequest) -> JitpResult<()> {
        let payload = serde_json::to_vec(request)?;
        debug!(function = %self.function, thing = %request.device_id, "invoking record creation");

        let reply = self.invoker.invoke(&self.function, payload).await?;
        let status: HandlerStatus = serde_json::from_slice(&reply).map_err(|e| {
            JitpError::Remote(ServiceError::other(
                "Invoke",
                format!("{} returned an unreadable reply: {e}", self.function),
            ))
        })?;

        if status.is_success() {
            Ok(())
        } else {
            Err(JitpError::Remote(ServiceError::other(
                "Invoke",
                format!(
                    "{} reported failure: {}",
                    self.function,
                    status.message.as_deref().unwrap_or("no message")
                ),
            )))
        }
    }
}

/// Dispatch chosen at startup from configuration.
#[derive(Debug, Clone)]
pub enum ConfiguredDispatch<R, I> {
    /// In process
    Inline(InlineDispatch<R>),
    /// Through a function invocation
    Invocation(InvocationDispatch<I>),
}

#[async_trait]
impl<R, I> RecordDispatch for ConfiguredDispatch<R, I>
where
    R: ThingRegistryEffects,
    I: InvocationEffects,
{
    async fn dispatch(&self, request: &ThingCreationRequest) -> JitpResult<()> {
        match self {
            Self::Inline(inline) => inline.dispatch(request).await,
            Self::Invocation(invocation) => invocation.dispatch(request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use jitp_core::{DeviceId, Principal, ServiceErrorKind};
    use jitp_testkit::{MemoryControlPlane, RecordingInvoker};
    use serde_json::json;

    fn request() -> ThingCreationRequest {
        ThingCreationRequest {
            device_id: DeviceId::new("dev-42").unwrap(),
            certificate_arn: Principal::new("arn:aws:iot:us-east-2:111:cert/c1").unwrap(),
        }
    }

    #[tokio::test]
    async fn inline_provisions_record() {
        let registry = Arc::new(MemoryControlPlane::default());
        InlineDispatch::new(Arc::clone(&registry))
            .dispatch(&request())
            .await
            .unwrap();
        assert_eq!(
            registry.thing_principals(&request().device_id).await,
            Some(vec![request().certificate_arn])
        );
    }

    #[tokio::test]
    async fn invocation_sends_camel_case_payload() {
        let invoker = Arc::new(RecordingInvoker::replying(HandlerStatus::success()));
        InvocationDispatch::new(Arc::clone(&invoker), "createThing")
            .dispatch(&request())
            .await
            .unwrap();

        let calls = invoker.calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].function, "createThing");
        assert_eq!(
            calls[0].payload,
            json!({"deviceId": "dev-42", "certificateArn": "arn:aws:iot:us-east-2:111:cert/c1"})
        );
    }

    #[tokio::test]
    async fn error_reply_is_remote_failure() {
        let invoker = Arc::new(RecordingInvoker::replying(HandlerStatus::error("quota")));
        let err = InvocationDispatch::new(invoker, "createThing")
            .dispatch(&request())
            .await
            .unwrap_err();
        assert_matches!(err, JitpError::Remote(ref e) if e.to_string().contains("quota"));
    }

    #[tokio::test]
    async fn unreadable_reply_is_remote_failure() {
        let invoker = Arc::new(RecordingInvoker::replying_raw("<html>"));
        let err = InvocationDispatch::new(invoker, "createThing")
            .dispatch(&request())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), jitp_core::ErrorKind::Remote(ServiceErrorKind::Other));
    }

    #[tokio::test]
    async fn invoke_failure_keeps_its_kind() {
        let invoker = Arc::new(RecordingInvoker::failing(ServiceError::new(
            ServiceErrorKind::Throttled,
            "Invoke",
            "rate exceeded",
        )));
        let err = InvocationDispatch::new(invoker, "createThing")
            .dispatch(&request())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), jitp_core::ErrorKind::Remote(ServiceErrorKind::Throttled));
    }
}
