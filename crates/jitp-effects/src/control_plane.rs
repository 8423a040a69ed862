//! Local control plane
//!
//! A filesystem-backed stand-in for the credential service, policy store and
//! device registry, so every workflow can run end to end on one machine.
//! State lives in a single JSON document under the configured root and is
//! rewritten (via a temporary file and rename) after every mutating call.
//!
//! Certificates are real X.509: issued ones are minted with `rcgen`, and
//! externally created ones can be registered from PEM. A certificate id is
//! the hex SHA-256 of its DER encoding.

use async_lock::Mutex;
use async_trait::async_trait;
use jitp_core::effects::{CredentialEffects, PolicyEffects, ThingRegistryEffects};
use jitp_core::types::{
    CertificateDescription, CertificateId, CertificateStatus, DeviceId, IssuedCredential,
    KeyPairPem, PolicyDocument, PolicyName, Principal, ThingDescription,
};
use jitp_core::{AccountContext, ServiceError};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Subject CN of a certificate minted by [`LocalControlPlane`] for a key.
///
/// Derived from the public key so that every issued certificate resolves to
/// its own device record and policy.
pub fn issued_common_name(public_key_der: &[u8]) -> String {
    let fingerprint = certificate_fingerprint(public_key_der);
    format!("device-{}", &fingerprint[..16])
}

const STATE_FILE: &str = "control-plane.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredCertificate {
    status: CertificateStatus,
    pem: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredPolicy {
    document: PolicyDocument,
    targets: BTreeSet<Principal>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct State {
    certificates: BTreeMap<CertificateId, StoredCertificate>,
    policies: BTreeMap<PolicyName, StoredPolicy>,
    things: BTreeMap<DeviceId, BTreeSet<Principal>>,
}

/// Hex SHA-256 of a certificate's DER encoding
pub fn certificate_fingerprint(der: &[u8]) -> String {
    hex::encode(Sha256::digest(der))
}

/// Filesystem-backed control plane
#[derive(Debug)]
pub struct LocalControlPlane {
    account: AccountContext,
    state_path: PathBuf,
    lock: Mutex<()>,
}

impl LocalControlPlane {
    /// Keep state under `root` for `account`
    pub fn new(root: impl AsRef<Path>, account: AccountContext) -> Self {
        Self {
            account,
            state_path: root.as_ref().join(STATE_FILE),
            lock: Mutex::new(()),
        }
    }

    /// Account certificates belong to
    pub fn account(&self) -> &AccountContext {
        &self.account
    }

    /// Register an externally created certificate with `status`.
    ///
    /// Registering the same certificate again returns its id and leaves the
    /// stored status alone.
    pub async fn register_certificate(
        &self,
        certificate_pem: &str,
        status: CertificateStatus,
    ) -> Result<CertificateId, ServiceError> {
        const OPERATION: &str = "RegisterCertificate";
        let (_, pem) = x509_parser::pem::parse_x509_pem(certificate_pem.as_bytes())
            .map_err(|e| ServiceError::other(OPERATION, format!("not a PEM certificate: {e}")))?;
        pem.parse_x509()
            .map_err(|e| ServiceError::other(OPERATION, format!("not an X.509 certificate: {e}")))?;

        let id = CertificateId::new(certificate_fingerprint(&pem.contents))
            .map_err(|e| ServiceError::other(OPERATION, e.to_string()))?;
        let pem_body = certificate_pem.trim().to_string();

        self.mutate(OPERATION, |state| {
            state
                .certificates
                .entry(id.clone())
                .or_insert(StoredCertificate {
                    status,
                    pem: pem_body,
                });
            Ok(id.clone())
        })
        .await
    }

    async fn load(&self, operation: &str) -> Result<State, ServiceError> {
        match fs::read(&self.state_path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                ServiceError::other(operation, format!("corrupt control-plane state: {e}"))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(State::default()),
            Err(e) => Err(ServiceError::new(
                jitp_core::ServiceErrorKind::Unavailable,
                operation,
                format!("failed to read control-plane state: {e}"),
            )),
        }
    }

    async fn save(&self, operation: &str, state: &State) -> Result<(), ServiceError> {
        let unavailable = |e: std::io::Error| {
            ServiceError::new(
                jitp_core::ServiceErrorKind::Unavailable,
                operation,
                format!("failed to write control-plane state: {e}"),
            )
        };
        let body = serde_json::to_vec_pretty(state)
            .map_err(|e| ServiceError::other(operation, e.to_string()))?;

        if let Some(parent) = self.state_path.parent() {
            fs::create_dir_all(parent).await.map_err(unavailable)?;
        }
        let staging = self.state_path.with_extension("json.tmp");
        fs::write(&staging, body).await.map_err(unavailable)?;
        fs::rename(&staging, &self.state_path)
            .await
            .map_err(unavailable)
    }

    async fn read<T>(
        &self,
        operation: &str,
        f: impl FnOnce(&State) -> Result<T, ServiceError>,
    ) -> Result<T, ServiceError> {
        let _guard = self.lock.lock().await;
        let state = self.load(operation).await?;
        f(&state)
    }

    async fn mutate<T>(
        &self,
        operation: &str,
        f: impl FnOnce(&mut State) -> Result<T, ServiceError>,
    ) -> Result<T, ServiceError> {
        let _guard = self.lock.lock().await;
        let mut state = self.load(operation).await?;
        let result = f(&mut state)?;
        self.save(operation, &state).await?;
        debug!(operation, "control-plane state updated");
        Ok(result)
    }
}

fn mint() -> Result<(String, Vec<u8>, KeyPairPem), rcgen::Error> {
    let key_pair = KeyPair::generate()?;
    let mut params = CertificateParams::new(Vec::<String>::new())?;
    let mut dn = DistinguishedName::new();
    dn.push(
        DnType::CommonName,
        issued_common_name(&key_pair.public_key_der()),
    );
    params.distinguished_name = dn;

    let cert = params.self_signed(&key_pair)?;
    Ok((
        cert.pem(),
        cert.der().to_vec(),
        KeyPairPem {
            private_key: key_pair.serialize_pem(),
            public_key: key_pair.public_key_pem(),
        },
    ))
}

#[async_trait]
impl CredentialEffects for LocalControlPlane {
    async fn describe_certificate(
        &self,
        certificate: &CertificateId,
    ) -> Result<CertificateDescription, ServiceError> {
        self.read("DescribeCertificate", |state| {
            let stored = state.certificates.get(certificate).ok_or_else(|| {
                ServiceError::not_found("DescribeCertificate", certificate.to_string())
            })?;
            Ok(CertificateDescription {
                certificate_id: certificate.clone(),
                certificate_arn: Some(self.account.certificate_arn(certificate)),
                status: stored.status,
                certificate_pem: Some(stored.pem.clone()),
            })
        })
        .await
    }

    async fn update_certificate_status(
        &self,
        certificate: &CertificateId,
        status: CertificateStatus,
    ) -> Result<(), ServiceError> {
        self.mutate("UpdateCertificate", |state| {
            let stored = state.certificates.get_mut(certificate).ok_or_else(|| {
                ServiceError::not_found("UpdateCertificate", certificate.to_string())
            })?;
            if !stored.status.can_transition_to(status) {
                return Err(ServiceError::other(
                    "UpdateCertificate",
                    format!(
                        "certificate {certificate} cannot move from {} to {status}",
                        stored.status
                    ),
                ));
            }
            stored.status = status;
            Ok(())
        })
        .await
    }

    async fn create_keys_and_certificate(
        &self,
        set_as_active: bool,
    ) -> Result<IssuedCredential, ServiceError> {
        const OPERATION: &str = "CreateKeysAndCertificate";
        let (certificate_pem, der, key_pair) =
            mint().map_err(|e| ServiceError::other(OPERATION, e.to_string()))?;
        let certificate_id = CertificateId::new(certificate_fingerprint(&der))
            .map_err(|e| ServiceError::other(OPERATION, e.to_string()))?;
        let status = if set_as_active {
            CertificateStatus::Active
        } else {
            CertificateStatus::Inactive
        };

        let stored = StoredCertificate {
            status,
            pem: certificate_pem.clone(),
        };
        self.mutate(OPERATION, |state| {
            state.certificates.insert(certificate_id.clone(), stored);
            Ok(())
        })
        .await?;

        Ok(IssuedCredential {
            certificate_arn: self.account.certificate_arn(&certificate_id),
            certificate_id,
            certificate_pem,
            key_pair,
        })
    }
}

#[async_trait]
impl PolicyEffects for LocalControlPlane {
    async fn list_targets_for_policy(
        &self,
        policy: &PolicyName,
    ) -> Result<Vec<Principal>, ServiceError> {
        self.read("ListTargetsForPolicy", |state| {
            state
                .policies
                .get(policy)
                .map(|p| p.targets.iter().cloned().collect())
                .ok_or_else(|| ServiceError::not_found("ListTargetsForPolicy", policy.to_string()))
        })
        .await
    }

    async fn attach_policy(
        &self,
        policy: &PolicyName,
        target: &Principal,
    ) -> Result<(), ServiceError> {
        self.mutate("AttachPolicy", |state| {
            let stored = state
                .policies
                .get_mut(policy)
                .ok_or_else(|| ServiceError::not_found("AttachPolicy", policy.to_string()))?;
            stored.targets.insert(target.clone());
            Ok(())
        })
        .await
    }

    async fn detach_policy(
        &self,
        policy: &PolicyName,
        target: &Principal,
    ) -> Result<(), ServiceError> {
        self.mutate("DetachPolicy", |state| {
            let stored = state
                .policies
                .get_mut(policy)
                .ok_or_else(|| ServiceError::not_found("DetachPolicy", policy.to_string()))?;
            stored.targets.remove(target);
            Ok(())
        })
        .await
    }

    async fn delete_policy(&self, policy: &PolicyName) -> Result<(), ServiceError> {
        self.mutate("DeletePolicy", |state| {
            let attached = state
                .policies
                .get(policy)
                .map(|p| p.targets.len())
                .ok_or_else(|| ServiceError::not_found("DeletePolicy", policy.to_string()))?;
            if attached > 0 {
                return Err(ServiceError::other(
                    "DeletePolicy",
                    format!("{policy} is still attached to {attached} target(s)"),
                ));
            }
            state.policies.remove(policy);
            Ok(())
        })
        .await
    }

    async fn create_policy(
        &self,
        policy: &PolicyName,
        document: &PolicyDocument,
    ) -> Result<(), ServiceError> {
        self.mutate("CreatePolicy", |state| {
            if state.policies.contains_key(policy) {
                return Err(ServiceError::already_exists(
                    "CreatePolicy",
                    policy.to_string(),
                ));
            }
            state.policies.insert(
                policy.clone(),
                StoredPolicy {
                    document: document.clone(),
                    targets: BTreeSet::new(),
                },
            );
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl ThingRegistryEffects for LocalControlPlane {
    async fn create_thing(&self, thing: &DeviceId) -> Result<(), ServiceError> {
        self.mutate("CreateThing", |state| {
            if state.things.contains_key(thing) {
                return Err(ServiceError::already_exists("CreateThing", thing.to_string()));
            }
            state.things.insert(thing.clone(), BTreeSet::new());
            Ok(())
        })
        .await
    }

    async fn describe_thing(&self, thing: &DeviceId) -> Result<ThingDescription, ServiceError> {
        self.read("DescribeThing", |state| {
            if !state.things.contains_key(thing) {
                return Err(ServiceError::not_found("DescribeThing", thing.to_string()));
            }
            Ok(ThingDescription {
                thing_name: thing.clone(),
                thing_arn: Some(format!(
                    "arn:aws:iot:{}:{}:thing/{thing}",
                    self.account.region, self.account.account_id
                )),
            })
        })
        .await
    }

    async fn attach_thing_principal(
        &self,
        thing: &DeviceId,
        principal: &Principal,
    ) -> Result<(), ServiceError> {
        self.mutate("AttachThingPrincipal", |state| {
            let principals = state.things.get_mut(thing).ok_or_else(|| {
                ServiceError::not_found("AttachThingPrincipal", thing.to_string())
            })?;
            if !principals.insert(principal.clone()) {
                return Err(ServiceError::already_exists(
                    "AttachThingPrincipal",
                    format!("{principal} is already bound to {thing}"),
                ));
            }
            Ok(())
        })
        .await
    }

    async fn list_thing_principals(
        &self,
        thing: &DeviceId,
    ) -> Result<Vec<Principal>, ServiceError> {
        self.read("ListThingPrincipals", |state| {
            state
                .things
                .get(thing)
                .map(|p| p.iter().cloned().collect())
                .ok_or_else(|| ServiceError::not_found("ListThingPrincipals", thing.to_string()))
        })
        .await
    }

    async fn detach_thing_principal(
        &self,
        thing: &DeviceId,
        principal: &Principal,
    ) -> Result<(), ServiceError> {
        self.mutate("DetachThingPrincipal", |state| {
            let principals = state.things.get_mut(thing).ok_or_else(|| {
                ServiceError::not_found("DetachThingPrincipal", thing.to_string())
            })?;
            if !principals.remove(principal) {
                return Err(ServiceError::not_found(
                    "DetachThingPrincipal",
                    format!("{principal} is not bound to {thing}"),
                ));
            }
            Ok(())
        })
        .await
    }

    async fn delete_thing(&self, thing: &DeviceId) -> Result<(), ServiceError> {
        self.mutate("DeleteThing", |state| {
            let bound = state
                .things
                .get(thing)
                .map(BTreeSet::len)
                .ok_or_else(|| ServiceError::not_found("DeleteThing", thing.to_string()))?;
            if bound > 0 {
                return Err(ServiceError::other(
                    "DeleteThing",
                    format!("{thing} still has {bound} principal(s)"),
                ));
            }
            state.things.remove(thing);
            Ok(())
        })
        .await
    }
}
