//! Trigger entry points.
//!
//! Each entry point takes the raw event as delivered by the router, runs one
//! workflow, and returns the status object for the trigger system. Errors are
//! logged and returned unchanged; redelivery is the caller's business.

use crate::activation::ActivationOrchestrator;
use crate::device_record::DeviceRecordProvisioner;
use crate::dispatch::RecordDispatch;
use crate::issuance::BootstrapIssuer;
use crate::telemetry::TelemetryArchiver;
use jitp_core::effects::{ArchiveEffects, ControlPlaneEffects, PhysicalTimeEffects};
use jitp_core::types::{
    BootstrapScope, CreateThingRequest, DeleteThingRequest, IssuedCredential,
    ThingCreationRequest,
};
use jitp_core::{AccountContext, HandlerStatus, JitpError, JitpResult};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Event-driven entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPoint {
    /// `{certificateId, certificateStatus, awsAccountId}`
    CertificateRegistered,
    /// `{certificateId, deviceId}`
    ActivationRequested,
    /// `{deviceId, certificateArn}`
    ThingCreation,
    /// `{deviceId, certId}`
    CreateThing,
    /// `{deviceId}`
    DeleteThing,
    /// `{deviceId, ...}`
    DeviceData,
    /// Anything
    Upload,
}

impl EntryPoint {
    /// Every event-driven entry point
    pub const ALL: [EntryPoint; 7] = [
        Self::CertificateRegistered,
        Self::ActivationRequested,
        Self::ThingCreation,
        Self::CreateThing,
        Self::DeleteThing,
        Self::DeviceData,
        Self::Upload,
    ];

    /// Name used on the command line and in logs
    pub fn name(self) -> &'static str {
        match self {
            Self::CertificateRegistered => "certificate-registered",
            Self::ActivationRequested => "activation-requested",
            Self::ThingCreation => "thing-creation",
            Self::CreateThing => "create-thing",
            Self::DeleteThing => "delete-thing",
            Self::DeviceData => "device-data",
            Self::Upload => "upload",
        }
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EntryPoint {
    type Err = JitpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|entry| entry.name() == s)
            .ok_or_else(|| JitpError::configuration(format!("unknown entry point: {s}")))
    }
}

/// All workflows wired to one set of handlers.
pub struct ProvisioningService<C, A, T, D> {
    orchestrator: ActivationOrchestrator<C, A, D>,
    records: DeviceRecordProvisioner<C>,
    issuer: BootstrapIssuer<C>,
    telemetry: TelemetryArchiver<A, T>,
    account: AccountContext,
}

impl<C, A, T, D> ProvisioningService<C, A, T, D>
where
    C: ControlPlaneEffects,
    A: ArchiveEffects,
    T: PhysicalTimeEffects,
    D: RecordDispatch,
{
    /// Wire every workflow to the given handlers
    pub fn new(
        control_plane: Arc<C>,
        archive: Arc<A>,
        clock: Arc<T>,
        dispatch: Arc<D>,
        account: AccountContext,
        bootstrap_scope: BootstrapScope,
    ) -> Self {
        Self {
            orchestrator: ActivationOrchestrator::new(
                Arc::clone(&control_plane),
                Arc::clone(&archive),
                dispatch,
                account.clone(),
            ),
            records: DeviceRecordProvisioner::new(Arc::clone(&control_plane)),
            issuer: BootstrapIssuer::new(control_plane, bootstrap_scope),
            telemetry: TelemetryArchiver::new(archive, clock),
            account,
        }
    }

    /// Route a raw event to `entry`
    pub async fn handle(&self, entry: EntryPoint, payload: &Value) -> JitpResult<HandlerStatus> {
        debug!(entry = %entry, payload = %payload, "received event");
        let result = match entry {
            EntryPoint::CertificateRegistered => self.certificate_registered(payload).await,
            EntryPoint::ActivationRequested => self.activation_requested(payload).await,
            EntryPoint::ThingCreation => self.thing_creation(payload).await,
            EntryPoint::CreateThing => self.create_thing(payload).await,
            EntryPoint::DeleteThing => self.delete_thing(payload).await,
            EntryPoint::DeviceData => self.device_data(payload).await,
            EntryPoint::Upload => self.upload(payload).await,
        };
        if let Err(err) = &result {
            error!(entry = %entry, kind = ?err.kind(), error = %err, "event processing failed");
        }
        result
    }

    /// Certificate registration event
    pub async fn certificate_registered(&self, payload: &Value) -> JitpResult<HandlerStatus> {
        let report = self.orchestrator.on_certificate_registered(payload).await?;
        Ok(report.to_status())
    }

    /// Device-initiated activation request
    pub async fn activation_requested(&self, payload: &Value) -> JitpResult<HandlerStatus> {
        let report = self.orchestrator.on_activation_requested(payload).await?;
        Ok(report.to_status())
    }

    /// Record creation as invoked by the activation workflow
    pub async fn thing_creation(&self, payload: &Value) -> JitpResult<HandlerStatus> {
        let request = ThingCreationRequest::from_value(payload)?;
        self.records
            .provision(&request.device_id, &request.certificate_arn)
            .await?;
        Ok(HandlerStatus::success().with_thing(&request.device_id))
    }

    /// Record creation for a certificate in this account
    pub async fn create_thing(&self, payload: &Value) -> JitpResult<HandlerStatus> {
        let request = CreateThingRequest::from_value(payload)?;
        let principal = self.account.certificate_arn(&request.certificate_id);
        self.records.provision(&request.device_id, &principal).await?;
        Ok(HandlerStatus::success().with_thing(&request.device_id))
    }

    /// Record deletion
    pub async fn delete_thing(&self, payload: &Value) -> JitpResult<HandlerStatus> {
        let request = DeleteThingRequest::from_value(payload)?;
        self.records.deprovision(&request.device_id).await?;
        Ok(HandlerStatus::success().with_thing(&request.device_id))
    }

    /// Telemetry message
    pub async fn device_data(&self, payload: &Value) -> JitpResult<HandlerStatus> {
        let (device, key) = self.telemetry.device_data(payload).await?;
        Ok(HandlerStatus::success().with_device(&device).with_key(key))
    }

    /// Raw upload
    pub async fn upload(&self, payload: &Value) -> JitpResult<HandlerStatus> {
        let key = self.telemetry.upload(payload).await?;
        Ok(HandlerStatus::success().with_key(key))
    }

    /// Issue a certificate with the bootstrap policy attached.
    ///
    /// Returns the credential itself, since the private key is not kept
    /// anywhere else.
    pub async fn issue_bootstrap_credential(&self) -> JitpResult<IssuedCredential> {
        let issued = self.issuer.issue().await.map_err(|err| {
            error!(kind = ?err.kind(), error = %err, "bootstrap issuance failed");
            err
        })?;
        info!(certificate = %issued.certificate_id, "bootstrap credential ready");
        Ok(issued)
    }
}
