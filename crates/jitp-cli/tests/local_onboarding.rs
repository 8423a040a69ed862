//! Onboarding through the CLI runtime against on-disk state.

use jitp_cli::handlers::{
    handle_create_ca, handle_device_cert, handle_event, handle_issue, handle_register,
    read_payload,
};
use jitp_cli::Runtime;
use jitp_core::effects::{CredentialEffects, PolicyEffects, ThingRegistryEffects};
use jitp_core::types::Outcome;
use jitp_core::{CertificateId, CertificateStatus, DeviceId, JitpConfig, PolicyName, ProvisioningMode};
use jitp_provisioning::{EntryPoint, IdentityExtractor};
use jitp_testkit::fixtures;
use serde_json::{json, Value};
use std::path::Path;
use tempfile::TempDir;

fn config(dir: &Path) -> JitpConfig {
    let mut config = JitpConfig {
        account_id: Some("123456789012".to_string()),
        ..JitpConfig::default()
    };
    config.archive.root = dir.join("archive");
    config.control_plane.root = dir.join("state");
    config
}

fn archived(config: &JitpConfig, key: &str) -> Value {
    let path = config.archive.root.join(&config.archive.bucket).join(key);
    let bytes = std::fs::read(&path).unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn registered_device_is_onboarded_end_to_end() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path());
    let runtime = Runtime::from_config(&config).unwrap();

    let cert = dir.path().join("device.pem");
    std::fs::write(&cert, fixtures::certificate_pem("sensor-7")).unwrap();

    let (event, status) = handle_register(&runtime, &cert, true).await.unwrap();
    let status = status.unwrap();
    assert_eq!(status.status, Outcome::Success);
    assert_eq!(status.device_id.as_deref(), Some("sensor-7"));

    let certificate = CertificateId::new(event["certificateId"].as_str().unwrap()).unwrap();
    let key = format!("firstconnection/{}", certificate.as_str());
    assert_eq!(status.key.as_deref(), Some(key.as_str()));
    assert_eq!(archived(&config, &key), event);

    let device = DeviceId::new("sensor-7").unwrap();
    let principal = config.account().unwrap().certificate_arn(&certificate);
    assert_eq!(
        runtime
            .local
            .describe_certificate(&certificate)
            .await
            .unwrap()
            .status,
        CertificateStatus::Active
    );
    assert_eq!(
        runtime
            .local
            .list_targets_for_policy(&PolicyName::for_device(&device))
            .await
            .unwrap(),
        vec![principal.clone()]
    );
    assert_eq!(
        runtime.local.list_thing_principals(&device).await.unwrap(),
        vec![principal]
    );
}

#[tokio::test]
async fn state_survives_a_new_process() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path());
    let cert = dir.path().join("device.pem");
    std::fs::write(&cert, fixtures::certificate_pem("sensor-8")).unwrap();

    let event = {
        let runtime = Runtime::from_config(&config).unwrap();
        let (event, status) = handle_register(&runtime, &cert, false).await.unwrap();
        assert!(status.is_none());
        event
    };

    // Redelivery to a fresh process sees the pending certificate on disk.
    let runtime = Runtime::from_config(&config).unwrap();
    let status = handle_event(&runtime, EntryPoint::CertificateRegistered, &event)
        .await
        .unwrap();
    assert_eq!(status.device_id.as_deref(), Some("sensor-8"));

    let device = DeviceId::new("sensor-8").unwrap();
    let thing = runtime.local.describe_thing(&device).await.unwrap();
    assert_eq!(thing.thing_name, device);
}

#[tokio::test]
async fn invoke_mode_provisions_through_the_loopback_function() {
    let dir = TempDir::new().unwrap();
    let mut config = config(dir.path());
    config.provisioning.mode = ProvisioningMode::Invoke;
    config.provisioning.function_name = Some("thing-creation".to_string());
    let runtime = Runtime::from_config(&config).unwrap();

    let cert = dir.path().join("device.pem");
    std::fs::write(&cert, fixtures::certificate_pem("sensor-9")).unwrap();
    handle_register(&runtime, &cert, true).await.unwrap();

    let device = DeviceId::new("sensor-9").unwrap();
    assert_eq!(runtime.local.list_thing_principals(&device).await.unwrap().len(), 1);
}

#[tokio::test]
async fn issued_credential_is_written_and_activates_on_request() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path());
    let runtime = Runtime::from_config(&config).unwrap();
    let out = dir.path().join("issued");

    let (issued, written) = handle_issue(&runtime, Some(&out)).await.unwrap();
    assert_eq!(written.len(), 3);
    let pem = std::fs::read_to_string(out.join(format!(
        "{}.cert.pem",
        issued.certificate_id.as_str()
    )))
    .unwrap();
    assert_eq!(pem, issued.certificate_pem);

    let device = IdentityExtractor::extract(&issued.certificate_pem).unwrap();
    let request = dir.path().join("request.json");
    std::fs::write(
        &request,
        json!({
            "certificateId": issued.certificate_id.as_str(),
            "deviceId": device.as_str(),
        })
        .to_string(),
    )
    .unwrap();
    let event = read_payload(Some(&request)).await.unwrap();
    let status = handle_event(&runtime, EntryPoint::ActivationRequested, &event)
        .await
        .unwrap();
    assert_eq!(status.status, Outcome::Success);

    // The bootstrap policy no longer exists once the device policy is in place.
    assert!(runtime
        .local
        .list_targets_for_policy(&PolicyName::bootstrap(&issued.certificate_id))
        .await
        .is_err());
}

#[tokio::test]
async fn unknown_device_delete_is_reported() {
    let dir = TempDir::new().unwrap();
    let runtime = Runtime::from_config(&config(dir.path())).unwrap();

    let err = handle_event(
        &runtime,
        EntryPoint::DeleteThing,
        &json!({ "deviceId": "ghost" }),
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("delete-thing"));
}

#[tokio::test]
async fn ca_signed_device_certificate_onboards_under_its_device_id() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path());
    let runtime = Runtime::from_config(&config).unwrap();
    let ca_dir = dir.path().join("ca");

    let written = handle_create_ca(&ca_dir, "JITP Root CA", false).await.unwrap();
    assert_eq!(written.len(), 2);
    assert!(handle_create_ca(&ca_dir, "JITP Root CA", false).await.is_err());

    let device = DeviceId::new("thermostat-3").unwrap();
    let out = dir.path().join("devices");
    let files = handle_device_cert(&ca_dir, &device, &out).await.unwrap();
    assert_eq!(files[0], out.join("thermostat-3.cert.pem"));
    assert!(files[1].exists());

    let (_, status) = handle_register(&runtime, &files[0], true).await.unwrap();
    assert_eq!(status.unwrap().device_id.as_deref(), Some("thermostat-3"));
    assert_eq!(runtime.local.list_thing_principals(&device).await.unwrap().len(), 1);
}

#[tokio::test]
async fn issued_credentials_keep_their_own_policies() {
    let dir = TempDir::new().unwrap();
    let runtime = Runtime::from_config(&config(dir.path())).unwrap();

    let mut issued = Vec::new();
    for _ in 0..2 {
        let (credential, _) = handle_issue(&runtime, None).await.unwrap();
        let device = IdentityExtractor::extract(&credential.certificate_pem).unwrap();
        let event = json!({
            "certificateId": credential.certificate_id.as_str(),
            "deviceId": device.as_str(),
        });
        handle_event(&runtime, EntryPoint::ActivationRequested, &event)
            .await
            .unwrap();
        issued.push((credential, device));
    }

    assert_ne!(issued[0].1, issued[1].1);
    for (credential, device) in &issued {
        assert_eq!(
            runtime
                .local
                .list_targets_for_policy(&PolicyName::for_device(device))
                .await
                .unwrap(),
            vec![credential.certificate_arn.clone()]
        );
    }
}
