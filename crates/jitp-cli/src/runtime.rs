//! Handler wiring for one CLI process.
//!
//! Every handler is built once from configuration and shared; workflows only
//! ever see the effect traits.

use async_trait::async_trait;
use jitp_core::effects::InvocationEffects;
use jitp_core::types::ThingCreationRequest;
use jitp_core::{HandlerStatus, JitpConfig, JitpResult, ProvisioningMode, ServiceError};
use jitp_effects::{
    BoundedControlPlane, CallBudget, FilesystemArchiveHandler, LocalControlPlane,
    SystemTimeHandler,
};
use jitp_provisioning::{
    ConfiguredDispatch, DeviceRecordProvisioner, InlineDispatch, InvocationDispatch,
    ProvisioningService,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Control plane as seen by the workflows
pub type ControlPlane = BoundedControlPlane<LocalControlPlane>;
/// Archive sink as seen by the workflows
pub type Archive = BoundedControlPlane<FilesystemArchiveHandler>;
/// Record dispatch chosen by `provisioning.mode`
pub type Dispatch = ConfiguredDispatch<ControlPlane, LoopbackInvoker>;
/// Fully wired service
pub type Service = ProvisioningService<ControlPlane, Archive, SystemTimeHandler, Dispatch>;

/// Invoker that runs the record-creation function in this process.
///
/// Stands in for a separately deployed function so `invoke` mode can be
/// exercised locally; the request still goes through JSON both ways.
pub struct LoopbackInvoker {
    function: String,
    records: DeviceRecordProvisioner<ControlPlane>,
}

impl LoopbackInvoker {
    /// Serve `function` against `control_plane`
    pub fn new(function: impl Into<String>, control_plane: Arc<ControlPlane>) -> Self {
        Self {
            function: function.into(),
            records: DeviceRecordProvisioner::new(control_plane),
        }
    }

    async fn thing_creation(&self, payload: &[u8]) -> JitpResult<HandlerStatus> {
        let value: serde_json::Value = serde_json::from_slice(payload)?;
        let request = ThingCreationRequest::from_value(&value)?;
        self.records
            .provision(&request.device_id, &request.certificate_arn)
            .await?;
        Ok(HandlerStatus::success().with_thing(&request.device_id))
    }
}

#[async_trait]
impl InvocationEffects for LoopbackInvoker {
    async fn invoke(&self, function: &str, payload: Vec<u8>) -> Result<Vec<u8>, ServiceError> {
        if function != self.function {
            return Err(ServiceError::not_found(
                "Invoke",
                format!("function {function} is not deployed"),
            ));
        }
        debug!(function, "loopback invocation");
        let status = self
            .thing_creation(&payload)
            .await
            .unwrap_or_else(|err| HandlerStatus::error(err.to_string()));
        serde_json::to_vec(&status).map_err(|e| ServiceError::other("Invoke", e.to_string()))
    }
}

/// Handlers and service for one process
pub struct Runtime {
    /// Unbounded local control plane, for operator commands
    pub local: Arc<LocalControlPlane>,
    /// Workflows wired to bounded handlers
    pub service: Service,
}

impl Runtime {
    /// Build every handler from `config`
    pub fn from_config(config: &JitpConfig) -> JitpResult<Self> {
        let account = config.account()?;
        let budget = CallBudget::from_config(config);

        let local = Arc::new(LocalControlPlane::new(
            &config.control_plane.root,
            account.clone(),
        ));
        let control_plane = Arc::new(BoundedControlPlane::new(Arc::clone(&local), budget));
        let archive = Arc::new(BoundedControlPlane::new(
            Arc::new(FilesystemArchiveHandler::new(
                &config.archive.root,
                &config.archive.bucket,
            )),
            budget,
        ));

        let dispatch = match (&config.provisioning.mode, &config.provisioning.function_name) {
            (ProvisioningMode::Invoke, Some(function)) => {
                let invoker = Arc::new(LoopbackInvoker::new(
                    function.clone(),
                    Arc::clone(&control_plane),
                ));
                ConfiguredDispatch::Invocation(InvocationDispatch::new(invoker, function.clone()))
            }
            _ => ConfiguredDispatch::Inline(InlineDispatch::new(Arc::clone(&control_plane))),
        };

        info!(
            region = %account.region,
            account = %account.account_id,
            mode = ?config.provisioning.mode,
            "provisioning runtime ready"
        );

        Ok(Self {
            local,
            service: ProvisioningService::new(
                control_plane,
                archive,
                Arc::new(SystemTimeHandler::new()),
                Arc::new(dispatch),
                account,
                config.bootstrap.scope,
            ),
        })
    }
}
