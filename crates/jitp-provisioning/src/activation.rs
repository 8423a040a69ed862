//! Activation workflow for newly connected certificates.
//!
//! One pass per trigger, with nothing persisted between stages:
//!
//! ```text
//! Received → CredentialActivated → IdentityResolved → BootstrapRetired
//!          → PolicyRotated → RecordProvisioned → Archived → Done
//! ```
//!
//! A certificate that is not waiting for activation skips straight to
//! `Archived`. Identity is always resolved before the first policy call, so
//! a certificate without a usable subject never has its access changed. Any
//! other failure is returned to the trigger system, whose redelivery reruns
//! the whole pass; every stage tolerates having already been done.

use crate::archival::{first_connection_key, EventArchiver};
use crate::dispatch::RecordDispatch;
use crate::identity::IdentityExtractor;
use crate::policy_rotation::PolicyRotator;
use jitp_core::effects::{ArchiveEffects, CredentialEffects, PolicyEffects};
use jitp_core::types::{ActivationRequest, CertificateRegistered, ThingCreationRequest};
use jitp_core::{
    AccountContext, CertificateDescription, CertificateId, CertificateStatus, DeviceId,
    HandlerStatus, JitpError, JitpResult, PolicyDocument, PolicyName, Principal,
};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument};

/// Stages a run passes through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationStage {
    /// Trigger parsed
    Received,
    /// Certificate status set to active
    CredentialActivated,
    /// Device identity read from the certificate subject
    IdentityResolved,
    /// Issuance-time policy detached and deleted
    BootstrapRetired,
    /// Device-scoped policy attached
    PolicyRotated,
    /// Device record exists with the certificate bound
    RecordProvisioned,
    /// Raw trigger written to the archive
    Archived,
    /// Run complete
    Done,
}

impl fmt::Display for ActivationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::CredentialActivated => "credential_activated",
            Self::IdentityResolved => "identity_resolved",
            Self::BootstrapRetired => "bootstrap_retired",
            Self::PolicyRotated => "policy_rotated",
            Self::RecordProvisioned => "record_provisioned",
            Self::Archived => "archived",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// What a completed run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationReport {
    /// Certificate the trigger named
    pub certificate_id: CertificateId,
    /// Device identity, when the run got that far
    pub device_id: Option<DeviceId>,
    /// Stages passed, in order
    pub stages: Vec<ActivationStage>,
    /// Archive key written
    pub archive_key: String,
    /// True when no policy or record work was done
    pub skipped: bool,
}

impl ActivationReport {
    /// Whether the run passed `stage`
    pub fn reached(&self, stage: ActivationStage) -> bool {
        self.stages.contains(&stage)
    }

    /// Status object for the trigger system
    pub fn to_status(&self) -> HandlerStatus {
        let status = HandlerStatus::success()
            .with_certificate(&self.certificate_id)
            .with_key(self.archive_key.clone());
        match &self.device_id {
            Some(device) if !self.skipped => status.with_device(device).with_thing(device),
            _ => status,
        }
    }
}

/// Drives one certificate from registration to a provisioned device.
pub struct ActivationOrchestrator<C, A, D> {
    control_plane: Arc<C>,
    rotator: PolicyRotator<C>,
    archiver: EventArchiver<A>,
    dispatch: Arc<D>,
    account: AccountContext,
}

impl<C, A, D> ActivationOrchestrator<C, A, D>
where
    C: CredentialEffects + PolicyEffects,
    A: ArchiveEffects,
    D: RecordDispatch,
{
    /// Build an orchestrator from handlers constructed at startup
    pub fn new(
        control_plane: Arc<C>,
        archive: Arc<A>,
        dispatch: Arc<D>,
        account: AccountContext,
    ) -> Self {
        Self {
            rotator: PolicyRotator::new(Arc::clone(&control_plane)),
            control_plane,
            archiver: EventArchiver::new(archive),
            dispatch,
            account,
        }
    }

    /// Handle a certificate registration event.
    ///
    /// Only `PENDING_ACTIVATION` certificates are activated; every other
    /// status (or none) is archived without further work.
    #[instrument(skip_all, name = "certificate_registered")]
    pub async fn on_certificate_registered(&self, payload: &Value) -> JitpResult<ActivationReport> {
        let event = CertificateRegistered::from_value(payload)?;
        let certificate = event.certificate_id;
        let mut stages = vec![ActivationStage::Received];

        if event.certificate_status != Some(CertificateStatus::PendingActivation) {
            info!(
                certificate = %certificate,
                status = event.certificate_status.map_or("none", CertificateStatus::as_str),
                "certificate not pending activation, no action taken"
            );
            return self.finish(certificate, None, stages, payload).await;
        }

        let account = match event.aws_account_id {
            Some(account_id) => self.account.with_account(account_id),
            None => self.account.clone(),
        };

        self.control_plane
            .update_certificate_status(&certificate, CertificateStatus::Active)
            .await?;
        stages.push(ActivationStage::CredentialActivated);
        info!(certificate = %certificate, "certificate activated");

        let description = self.control_plane.describe_certificate(&certificate).await?;
        let device = resolve_identity(&description)?;
        stages.push(ActivationStage::IdentityResolved);
        info!(certificate = %certificate, device = %device, "resolved device identity");

        let principal = principal_for(&account, &description);
        self.provision(&account, &certificate, &device, &principal, &mut stages)
            .await?;

        self.finish(certificate, Some(device), stages, payload).await
    }

    /// Handle a device-initiated activation request.
    ///
    /// The claimed device id must match the certificate subject. Pending
    /// certificates are activated first; active ones go straight to policy
    /// work; any other status is archived without further work.
    #[instrument(skip_all, name = "activation_requested")]
    pub async fn on_activation_requested(&self, payload: &Value) -> JitpResult<ActivationReport> {
        let request = ActivationRequest::from_value(payload)?;
        let certificate = request.certificate_id;
        let mut stages = vec![ActivationStage::Received];

        let description = self.control_plane.describe_certificate(&certificate).await?;
        let device = resolve_identity(&description)?;
        if device != request.device_id {
            return Err(JitpError::malformed_input(format!(
                "claimed device {} does not match certificate subject {device}",
                request.device_id
            )));
        }

        match description.status {
            CertificateStatus::PendingActivation => {
                self.control_plane
                    .update_certificate_status(&certificate, CertificateStatus::Active)
                    .await?;
                stages.push(ActivationStage::CredentialActivated);
                info!(certificate = %certificate, "certificate activated");
            }
            CertificateStatus::Active => {}
            other => {
                info!(
                    certificate = %certificate,
                    status = %other,
                    "certificate cannot be activated, no action taken"
                );
                return self.finish(certificate, Some(device), stages, payload).await;
            }
        }
        stages.push(ActivationStage::IdentityResolved);

        let principal = principal_for(&self.account, &description);
        self.provision(&self.account, &certificate, &device, &principal, &mut stages)
            .await?;

        self.finish(certificate, Some(device), stages, payload).await
    }

    async fn provision(
        &self,
        account: &AccountContext,
        certificate: &CertificateId,
        device: &DeviceId,
        principal: &Principal,
        stages: &mut Vec<ActivationStage>,
    ) -> JitpResult<()> {
        self.rotator.retire(&PolicyName::bootstrap(certificate)).await?;
        stages.push(ActivationStage::BootstrapRetired);

        self.rotator
            .rotate(
                &PolicyName::for_device(device),
                &PolicyDocument::device_scoped(account, device),
                principal,
            )
            .await?;
        stages.push(ActivationStage::PolicyRotated);

        self.dispatch
            .dispatch(&ThingCreationRequest {
                device_id: device.clone(),
                certificate_arn: principal.clone(),
            })
            .await?;
        stages.push(ActivationStage::RecordProvisioned);
        Ok(())
    }

    async fn finish(
        &self,
        certificate: CertificateId,
        device_id: Option<DeviceId>,
        mut stages: Vec<ActivationStage>,
        payload: &Value,
    ) -> JitpResult<ActivationReport> {
        let skipped = !stages.contains(&ActivationStage::RecordProvisioned);
        let archive_key = self
            .archiver
            .archive(first_connection_key(&certificate), payload)
            .await?;
        stages.push(ActivationStage::Archived);
        stages.push(ActivationStage::Done);

        info!(
            certificate = %certificate,
            key = %archive_key,
            skipped,
            "activation run complete"
        );
        Ok(ActivationReport {
            certificate_id: certificate,
            device_id,
            stages,
            archive_key,
            skipped,
        })
    }
}

fn resolve_identity(description: &CertificateDescription) -> JitpResult<DeviceId> {
    let pem = description.certificate_pem.as_deref().ok_or_else(|| {
        JitpError::malformed_credential(format!(
            "no certificate body returned for {}",
            description.certificate_id
        ))
    })?;
    IdentityExtractor::extract(pem)
}

fn principal_for(account: &AccountContext, description: &CertificateDescription) -> Principal {
    description
        .certificate_arn
        .clone()
        .unwrap_or_else(|| account.certificate_arn(&description.certificate_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::InlineDispatch;
    use assert_matches::assert_matches;
    use jitp_testkit::{fixtures, MemoryArchive, MemoryControlPlane, Operation};
    use serde_json::json;

    type Orchestrator =
        ActivationOrchestrator<MemoryControlPlane, MemoryArchive, InlineDispatch<MemoryControlPlane>>;

    struct Harness {
        control_plane: Arc<MemoryControlPlane>,
        archive: Arc<MemoryArchive>,
        orchestrator: Orchestrator,
    }

    fn harness() -> Harness {
        let account = AccountContext::new("us-east-2", "111");
        let control_plane = Arc::new(MemoryControlPlane::new(account.clone()));
        let archive = Arc::new(MemoryArchive::new());
        let dispatch = Arc::new(InlineDispatch::new(Arc::clone(&control_plane)));
        Harness {
            orchestrator: ActivationOrchestrator::new(
                Arc::clone(&control_plane),
                Arc::clone(&archive),
                dispatch,
                account,
            ),
            control_plane,
            archive,
        }
    }

    fn cert(id: &str) -> CertificateId {
        CertificateId::new(id).unwrap()
    }

    #[tokio::test]
    async fn stages_are_recorded_in_order() {
        let h = harness();
        h.control_plane
            .insert_certificate(
                &cert("c1"),
                CertificateStatus::PendingActivation,
                Some(fixtures::certificate_pem("dev-42")),
            )
            .await;

        let report = h
            .orchestrator
            .on_certificate_registered(&json!({
                "certificateId": "c1",
                "certificateStatus": "PENDING_ACTIVATION",
                "awsAccountId": "111"
            }))
            .await
            .unwrap();

        assert_eq!(
            report.stages,
            vec![
                ActivationStage::Received,
                ActivationStage::CredentialActivated,
                ActivationStage::IdentityResolved,
                ActivationStage::BootstrapRetired,
                ActivationStage::PolicyRotated,
                ActivationStage::RecordProvisioned,
                ActivationStage::Archived,
                ActivationStage::Done,
            ]
        );
        assert!(!report.skipped);
        assert_eq!(
            serde_json::to_value(report.to_status()).unwrap(),
            json!({
                "status": "success",
                "certificateId": "c1",
                "deviceId": "dev-42",
                "thingName": "dev-42",
                "key": "firstconnection/c1"
            })
        );
    }

    #[tokio::test]
    async fn missing_status_is_skipped() {
        let h = harness();
        let report = h
            .orchestrator
            .on_certificate_registered(&json!({"certificateId": "c9"}))
            .await
            .unwrap();

        assert!(report.skipped);
        assert!(!report.reached(ActivationStage::CredentialActivated));
        assert!(h.control_plane.journal().await.is_empty());
        assert_eq!(h.archive.writes().await, vec!["firstconnection/c9".to_string()]);
    }

    #[tokio::test]
    async fn payload_account_scopes_the_device_policy() {
        let h = harness();
        h.control_plane
            .insert_certificate(
                &cert("c1"),
                CertificateStatus::PendingActivation,
                Some(fixtures::certificate_pem("dev-42")),
            )
            .await;

        h.orchestrator
            .on_certificate_registered(&json!({
                "certificateId": "c1",
                "certificateStatus": "PENDING_ACTIVATION",
                "awsAccountId": "222"
            }))
            .await
            .unwrap();

        let device = DeviceId::new("dev-42").unwrap();
        let document = h
            .control_plane
            .policy(&PolicyName::for_device(&device))
            .await
            .unwrap();
        assert_eq!(
            document,
            PolicyDocument::device_scoped(&AccountContext::new("us-east-2", "222"), &device)
        );
    }

    #[tokio::test]
    async fn missing_body_aborts_before_policy_work() {
        let h = harness();
        h.control_plane
            .insert_certificate(&cert("c1"), CertificateStatus::PendingActivation, None)
            .await;

        let err = h
            .orchestrator
            .on_certificate_registered(&json!({
                "certificateId": "c1",
                "certificateStatus": "PENDING_ACTIVATION"
            }))
            .await
            .unwrap_err();

        assert_matches!(err, JitpError::MalformedCredential { .. });
        assert!(!h
            .control_plane
            .operations()
            .await
            .iter()
            .any(|op| op.is_policy() || op.is_registry()));
        assert!(h.archive.writes().await.is_empty());
    }

    #[tokio::test]
    async fn request_with_wrong_claim_mutates_nothing() {
        let h = harness();
        h.control_plane
            .insert_certificate(
                &cert("c1"),
                CertificateStatus::PendingActivation,
                Some(fixtures::certificate_pem("dev-42")),
            )
            .await;

        let err = h
            .orchestrator
            .on_activation_requested(&json!({"certificateId": "c1", "deviceId": "dev-43"}))
            .await
            .unwrap_err();

        assert_matches!(err, JitpError::MalformedInput { .. });
        assert_eq!(h.control_plane.operations().await, vec![Operation::DescribeCertificate]);
        assert_eq!(
            h.control_plane.certificate_status(&cert("c1")).await,
            Some(CertificateStatus::PendingActivation)
        );
    }

    #[tokio::test]
    async fn request_for_active_certificate_skips_activation() {
        let h = harness();
        h.control_plane
            .insert_certificate(
                &cert("c1"),
                CertificateStatus::Active,
                Some(fixtures::certificate_pem("dev-42")),
            )
            .await;

        let report = h
            .orchestrator
            .on_activation_requested(&json!({"certificateId": "c1", "deviceId": "dev-42"}))
            .await
            .unwrap();

        assert!(!report.reached(ActivationStage::CredentialActivated));
        assert!(report.reached(ActivationStage::PolicyRotated));
        assert!(!h
            .control_plane
            .operations()
            .await
            .contains(&Operation::UpdateCertificate));
    }

    #[tokio::test]
    async fn request_for_revoked_certificate_is_archived_only() {
        let h = harness();
        h.control_plane
            .insert_certificate(
                &cert("c1"),
                CertificateStatus::Revoked,
                Some(fixtures::certificate_pem("dev-42")),
            )
            .await;

        let report = h
            .orchestrator
            .on_activation_requested(&json!({"certificateId": "c1", "deviceId": "dev-42"}))
            .await
            .unwrap();

        assert!(report.skipped);
        assert_eq!(h.control_plane.operations().await, vec![Operation::DescribeCertificate]);
        assert_eq!(h.archive.writes().await, vec!["firstconnection/c1".to_string()]);
        assert_eq!(
            serde_json::to_value(report.to_status()).unwrap(),
            json!({"status": "success", "certificateId": "c1", "key": "firstconnection/c1"})
        );
    }

    #[tokio::test]
    async fn archive_failure_is_surfaced_and_redelivery_recovers() {
        let h = harness();
        h.control_plane
            .insert_certificate(
                &cert("c1"),
                CertificateStatus::PendingActivation,
                Some(fixtures::certificate_pem("dev-42")),
            )
            .await;
        h.archive
            .fail_next_write(jitp_core::ServiceErrorKind::Unavailable)
            .await;
        let event = json!({
            "certificateId": "c1",
            "certificateStatus": "PENDING_ACTIVATION",
            "awsAccountId": "111"
        });

        assert!(h.orchestrator.on_certificate_registered(&event).await.is_err());
        assert!(h.archive.writes().await.is_empty());

        h.orchestrator.on_certificate_registered(&event).await.unwrap();
        assert_eq!(h.archive.writes().await, vec!["firstconnection/c1".to_string()]);
    }
}
