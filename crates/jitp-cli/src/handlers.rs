//! Command handlers.

use crate::runtime::Runtime;
use anyhow::{anyhow, bail, Context, Result};
use jitp_core::types::IssuedCredential;
use jitp_core::{CertificateStatus, DeviceId, HandlerStatus};
use jitp_effects::authority::{CA_CERTIFICATE_FILE, CA_KEY_FILE};
use jitp_effects::CertificateAuthority;
use jitp_provisioning::EntryPoint;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

/// Read an event from `path`, or stdin for `None` / `-`
pub async fn read_payload(path: Option<&Path>) -> Result<Value> {
    let bytes = match path {
        Some(path) if path != Path::new("-") => tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?,
        _ => {
            let mut buffer = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut buffer)
                .await
                .context("failed to read stdin")?;
            buffer
        }
    };
    serde_json::from_slice(&bytes).context("event is not valid JSON")
}

/// Run one entry point and return its status
pub async fn handle_event(
    runtime: &Runtime,
    entry: EntryPoint,
    payload: &Value,
) -> Result<HandlerStatus> {
    runtime
        .service
        .handle(entry, payload)
        .await
        .map_err(|e| anyhow!(e).context(format!("{entry} failed")))
}

/// Issue a bootstrap credential, optionally writing it to `out_dir`.
///
/// Returns the credential and the files written.
pub async fn handle_issue(
    runtime: &Runtime,
    out_dir: Option<&Path>,
) -> Result<(IssuedCredential, Vec<PathBuf>)> {
    let issued = runtime.service.issue_bootstrap_credential().await?;
    let Some(dir) = out_dir else {
        return Ok((issued, Vec::new()));
    };

    let id = issued.certificate_id.as_str();
    let written = write_files(
        dir,
        &[
            (format!("{id}.cert.pem"), issued.certificate_pem.as_str()),
            (format!("{id}.private.key"), issued.key_pair.private_key.as_str()),
            (format!("{id}.public.key"), issued.key_pair.public_key.as_str()),
        ],
    )
    .await?;
    Ok((issued, written))
}

async fn write_files(dir: &Path, files: &[(String, &str)]) -> Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("failed to create {}", dir.display()))?;

    let mut written = Vec::with_capacity(files.len());
    for (name, contents) in files {
        let path = dir.join(name);
        tokio::fs::write(&path, contents)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

/// Register a device certificate as pending activation and build the event
/// the registration would trigger. With `activate`, deliver it as well.
pub async fn handle_register(
    runtime: &Runtime,
    cert: &Path,
    activate: bool,
) -> Result<(Value, Option<HandlerStatus>)> {
    let pem = tokio::fs::read_to_string(cert)
        .await
        .with_context(|| format!("failed to read {}", cert.display()))?;
    let certificate = runtime
        .local
        .register_certificate(&pem, CertificateStatus::PendingActivation)
        .await?;

    let event = json!({
        "certificateId": certificate.as_str(),
        "certificateStatus": CertificateStatus::PendingActivation.as_str(),
        "awsAccountId": runtime.local.account().account_id,
    });

    let status = if activate {
        Some(handle_event(runtime, EntryPoint::CertificateRegistered, &event).await?)
    } else {
        None
    };
    Ok((event, status))
}

/// Create a certificate authority in `dir`. An existing one is kept unless
/// `force` is set.
pub async fn handle_create_ca(dir: &Path, common_name: &str, force: bool) -> Result<Vec<PathBuf>> {
    let certificate = dir.join(CA_CERTIFICATE_FILE);
    if !force && tokio::fs::try_exists(&certificate).await.unwrap_or(false) {
        bail!(
            "{} already exists, pass --force to replace it",
            certificate.display()
        );
    }

    let ca = CertificateAuthority::generate(common_name)?;
    let key = ca.private_key_pem();
    write_files(
        dir,
        &[
            (CA_CERTIFICATE_FILE.to_string(), ca.certificate_pem()),
            (CA_KEY_FILE.to_string(), key.as_str()),
        ],
    )
    .await
}

/// Load the certificate authority kept in `dir`
pub async fn load_ca(dir: &Path) -> Result<CertificateAuthority> {
    let read = |name: &'static str| {
        let path = dir.join(name);
        async move {
            tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))
        }
    };
    let certificate = read(CA_CERTIFICATE_FILE).await?;
    let key = read(CA_KEY_FILE).await?;
    Ok(CertificateAuthority::from_pem(&certificate, &key)?)
}

/// Sign a certificate for `device` and write it to `out_dir`.
///
/// Returns the files written, in order certificate then private key.
pub async fn handle_device_cert(
    ca_dir: &Path,
    device: &DeviceId,
    out_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let ca = load_ca(ca_dir).await?;
    let issued = ca.issue(device)?;
    write_files(
        out_dir,
        &[
            (format!("{device}.cert.pem"), issued.certificate_pem.as_str()),
            (format!("{device}.private.key"), issued.key_pair.private_key.as_str()),
        ],
    )
    .await
}
