//! Local control plane behaviour the workflows rely on.

use jitp_core::effects::{CredentialEffects, PolicyEffects, ThingRegistryEffects};
use jitp_core::types::BootstrapScope;
use jitp_core::{
    AccountContext, CertificateStatus, DeviceId, PolicyDocument, PolicyName, Principal,
    ServiceErrorKind,
};
use jitp_effects::{
    certificate_fingerprint, BoundedControlPlane, CallBudget, FilesystemArchiveHandler,
    LocalControlPlane,
};
use jitp_core::effects::ArchiveEffects;
use jitp_testkit::fixtures;
use std::sync::Arc;
use tempfile::TempDir;

fn account() -> AccountContext {
    AccountContext::new("us-east-2", "123456789012")
}

#[tokio::test]
async fn registered_certificate_is_described_with_its_body() {
    let dir = TempDir::new().unwrap();
    let cp = LocalControlPlane::new(dir.path(), account());
    let pem = fixtures::certificate_pem("dev-42");

    let id = cp
        .register_certificate(&pem, CertificateStatus::PendingActivation)
        .await
        .unwrap();
    let (_, parsed) = x509_parser::pem::parse_x509_pem(pem.as_bytes()).unwrap();
    assert_eq!(id.as_str(), certificate_fingerprint(&parsed.contents));

    let described = cp.describe_certificate(&id).await.unwrap();
    assert_eq!(described.status, CertificateStatus::PendingActivation);
    assert_eq!(described.certificate_pem.as_deref(), Some(pem.trim()));

    // Registering again keeps the current status.
    cp.update_certificate_status(&id, CertificateStatus::Active)
        .await
        .unwrap();
    let again = cp
        .register_certificate(&pem, CertificateStatus::PendingActivation)
        .await
        .unwrap();
    assert_eq!(again, id);
    assert_eq!(
        cp.describe_certificate(&id).await.unwrap().status,
        CertificateStatus::Active
    );
}

#[tokio::test]
async fn garbage_registration_is_rejected() {
    let dir = TempDir::new().unwrap();
    let cp = LocalControlPlane::new(dir.path(), account());
    let err = cp
        .register_certificate(&fixtures::garbage_pem(), CertificateStatus::PendingActivation)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ServiceErrorKind::Other);
}

#[tokio::test]
async fn revoked_certificate_cannot_be_reactivated() {
    let dir = TempDir::new().unwrap();
    let cp = LocalControlPlane::new(dir.path(), account());
    let id = cp
        .register_certificate(
            &fixtures::certificate_pem("dev-42"),
            CertificateStatus::Revoked,
        )
        .await
        .unwrap();

    let err = cp
        .update_certificate_status(&id, CertificateStatus::Active)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ServiceErrorKind::Other);
    assert_eq!(err.operation, "UpdateCertificate");
    assert_eq!(
        cp.describe_certificate(&id).await.unwrap().status,
        CertificateStatus::Revoked
    );

    // Revoking again is a no-op.
    cp.update_certificate_status(&id, CertificateStatus::Revoked)
        .await
        .unwrap();
}

#[tokio::test]
async fn policy_lifecycle_matches_remote_semantics() {
    let dir = TempDir::new().unwrap();
    let cp = LocalControlPlane::new(dir.path(), account());
    let policy = PolicyName::new("Policy_c1").unwrap();
    let target = Principal::new("arn:aws:iot:us-east-2:123456789012:cert/c1").unwrap();
    let document = PolicyDocument::bootstrap(BootstrapScope::ConnectOnly);

    assert!(cp.list_targets_for_policy(&policy).await.unwrap_err().is_not_found());
    cp.create_policy(&policy, &document).await.unwrap();
    assert!(cp
        .create_policy(&policy, &document)
        .await
        .unwrap_err()
        .is_already_exists());

    cp.attach_policy(&policy, &target).await.unwrap();
    assert_eq!(cp.delete_policy(&policy).await.unwrap_err().kind(), ServiceErrorKind::Other);

    cp.detach_policy(&policy, &target).await.unwrap();
    cp.delete_policy(&policy).await.unwrap();
    assert!(cp.delete_policy(&policy).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn record_lifecycle_matches_remote_semantics() {
    let dir = TempDir::new().unwrap();
    let cp = LocalControlPlane::new(dir.path(), account());
    let thing = DeviceId::new("dev-42").unwrap();
    let principal = Principal::new("arn:aws:iot:us-east-2:123456789012:cert/c1").unwrap();

    assert!(cp.describe_thing(&thing).await.unwrap_err().is_not_found());
    cp.create_thing(&thing).await.unwrap();
    cp.attach_thing_principal(&thing, &principal).await.unwrap();
    assert!(cp
        .attach_thing_principal(&thing, &principal)
        .await
        .unwrap_err()
        .is_already_exists());
    assert_eq!(cp.delete_thing(&thing).await.unwrap_err().kind(), ServiceErrorKind::Other);

    cp.detach_thing_principal(&thing, &principal).await.unwrap();
    assert!(cp
        .detach_thing_principal(&thing, &principal)
        .await
        .unwrap_err()
        .is_not_found());
    cp.delete_thing(&thing).await.unwrap();
    assert!(cp.list_thing_principals(&thing).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn bounded_wrapper_is_transparent_on_success() {
    let dir = TempDir::new().unwrap();
    let local = Arc::new(LocalControlPlane::new(dir.path().join("state"), account()));
    let bounded = BoundedControlPlane::new(Arc::clone(&local), CallBudget::default());

    let issued = bounded.create_keys_and_certificate(true).await.unwrap();
    assert_eq!(
        local
            .describe_certificate(&issued.certificate_id)
            .await
            .unwrap()
            .status,
        CertificateStatus::Active
    );

    let archive = BoundedControlPlane::new(
        Arc::new(FilesystemArchiveHandler::new(dir.path().join("archive"), "b")),
        CallBudget::default(),
    );
    archive
        .put_object("uploads/1.json", b"[]".to_vec())
        .await
        .unwrap();
    assert!(dir.path().join("archive/b/uploads/1.json").exists());
}
