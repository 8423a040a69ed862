//! In-memory control plane for testing
//!
//! Emulates the credential service, policy store and device registry with
//! the failure behaviour the workflows must cope with: `NotFound` for absent
//! resources, `AlreadyExists` on duplicate creates and bindings, and a
//! conflict on deleting a policy that is still attached or a record that
//! still has principals.
//!
//! Every attempted call is appended to a journal so tests can assert on
//! ordering, and faults can be injected per operation.

use async_lock::RwLock;
use async_trait::async_trait;
use jitp_core::effects::{CredentialEffects, PolicyEffects, ThingRegistryEffects};
use jitp_core::types::{
    CertificateDescription, CertificateId, CertificateStatus, DeviceId, IssuedCredential,
    PolicyDocument, PolicyName, Principal, ThingDescription,
};
use jitp_core::{AccountContext, ServiceError, ServiceErrorKind};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::fixtures;

/// Control-plane operations, as recorded in the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Read certificate status and body
    DescribeCertificate,
    /// Change certificate status
    UpdateCertificate,
    /// Mint keys and certificate
    CreateKeysAndCertificate,
    /// List policy attachments
    ListTargetsForPolicy,
    /// Attach a policy
    AttachPolicy,
    /// Detach a policy
    DetachPolicy,
    /// Delete a policy
    DeletePolicy,
    /// Create a policy
    CreatePolicy,
    /// Create a record
    CreateThing,
    /// Read a record
    DescribeThing,
    /// Bind a principal
    AttachThingPrincipal,
    /// List bound principals
    ListThingPrincipals,
    /// Unbind a principal
    DetachThingPrincipal,
    /// Delete a record
    DeleteThing,
}

impl Operation {
    /// Wire name of the operation
    pub fn name(self) -> &'static str {
        match self {
            Self::DescribeCertificate => "DescribeCertificate",
            Self::UpdateCertificate => "UpdateCertificate",
            Self::CreateKeysAndCertificate => "CreateKeysAndCertificate",
            Self::ListTargetsForPolicy => "ListTargetsForPolicy",
            Self::AttachPolicy => "AttachPolicy",
            Self::DetachPolicy => "DetachPolicy",
            Self::DeletePolicy => "DeletePolicy",
            Self::CreatePolicy => "CreatePolicy",
            Self::CreateThing => "CreateThing",
            Self::DescribeThing => "DescribeThing",
            Self::AttachThingPrincipal => "AttachThingPrincipal",
            Self::ListThingPrincipals => "ListThingPrincipals",
            Self::DetachThingPrincipal => "DetachThingPrincipal",
            Self::DeleteThing => "DeleteThing",
        }
    }

    /// Whether the operation changes control-plane state
    pub fn is_mutation(self) -> bool {
        !matches!(
            self,
            Self::DescribeCertificate
                | Self::ListTargetsForPolicy
                | Self::DescribeThing
                | Self::ListThingPrincipals
        )
    }

    /// Whether the operation touches the policy store
    pub fn is_policy(self) -> bool {
        matches!(
            self,
            Self::ListTargetsForPolicy
                | Self::AttachPolicy
                | Self::DetachPolicy
                | Self::DeletePolicy
                | Self::CreatePolicy
        )
    }

    /// Whether the operation touches the device registry
    pub fn is_registry(self) -> bool {
        matches!(
            self,
            Self::CreateThing
                | Self::DescribeThing
                | Self::AttachThingPrincipal
                | Self::ListThingPrincipals
                | Self::DetachThingPrincipal
                | Self::DeleteThing
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One journal entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Operation attempted
    pub operation: Operation,
    /// Policy, record or certificate addressed
    pub subject: String,
    /// Principal or status argument, if any
    pub argument: Option<String>,
    /// Whether the call returned an error
    pub failed: bool,
}

#[derive(Debug, Clone)]
struct Fault {
    operation: Operation,
    kind: ServiceErrorKind,
    remaining: Option<usize>,
}

#[derive(Debug, Clone)]
struct StoredCertificate {
    status: CertificateStatus,
    pem: Option<String>,
}

#[derive(Debug, Clone)]
struct StoredPolicy {
    document: PolicyDocument,
    targets: BTreeSet<Principal>,
}

#[derive(Debug, Default)]
struct State {
    certificates: BTreeMap<CertificateId, StoredCertificate>,
    policies: BTreeMap<PolicyName, StoredPolicy>,
    things: BTreeMap<DeviceId, BTreeSet<Principal>>,
    journal: Vec<Call>,
    faults: Vec<Fault>,
    issued: u64,
}

impl State {
    fn take_fault(&mut self, operation: Operation) -> Option<ServiceErrorKind> {
        let index = self.faults.iter().position(|f| f.operation == operation)?;
        let fault = &mut self.faults[index];
        let kind = fault.kind;
        if let Some(remaining) = fault.remaining.as_mut() {
            *remaining -= 1;
            if *remaining == 0 {
                self.faults.remove(index);
            }
        }
        Some(kind)
    }

    fn record(
        &mut self,
        operation: Operation,
        subject: impl fmt::Display,
        argument: Option<String>,
    ) -> Result<(), ServiceError> {
        let fault = self.take_fault(operation);
        self.journal.push(Call {
            operation,
            subject: subject.to_string(),
            argument,
            failed: fault.is_some(),
        });
        match fault {
            Some(kind) => Err(ServiceError::new(kind, operation.name(), "injected fault")),
            None => Ok(()),
        }
    }

    fn mark_failed(&mut self) {
        if let Some(last) = self.journal.last_mut() {
            last.failed = true;
        }
    }
}

/// Stateful in-memory control plane
#[derive(Debug, Clone)]
pub struct MemoryControlPlane {
    account: AccountContext,
    state: Arc<RwLock<State>>,
}

impl Default for MemoryControlPlane {
    fn default() -> Self {
        Self::new(AccountContext::new("us-east-2", "111"))
    }
}

/// Subject CN of the `n`th certificate issued by a [`MemoryControlPlane`].
pub fn issued_common_name(n: u64) -> String {
    format!("issued-{n}")
}

macro_rules! fail {
    ($state:expr, $err:expr) => {{
        $state.mark_failed();
        return Err($err);
    }};
}

impl MemoryControlPlane {
    /// Create an empty control plane for one account
    pub fn new(account: AccountContext) -> Self {
        Self {
            account,
            state: Arc::new(RwLock::new(State::default())),
        }
    }

    /// Account that issued certificates belong to
    pub fn account(&self) -> &AccountContext {
        &self.account
    }

    /// Seed a certificate
    pub async fn insert_certificate(
        &self,
        certificate: &CertificateId,
        status: CertificateStatus,
        pem: Option<String>,
    ) {
        self.state
            .write()
            .await
            .certificates
            .insert(certificate.clone(), StoredCertificate { status, pem });
    }

    /// Seed a policy with existing attachments
    pub async fn insert_policy(
        &self,
        policy: &PolicyName,
        document: PolicyDocument,
        targets: impl IntoIterator<Item = Principal>,
    ) {
        self.state.write().await.policies.insert(
            policy.clone(),
            StoredPolicy {
                document,
                targets: targets.into_iter().collect(),
            },
        );
    }

    /// Seed a record with bound principals
    pub async fn insert_thing(
        &self,
        thing: &DeviceId,
        principals: impl IntoIterator<Item = Principal>,
    ) {
        self.state
            .write()
            .await
            .things
            .insert(thing.clone(), principals.into_iter().collect());
    }

    /// Fail the next `count` calls to `operation` with `kind`
    pub async fn fail_next(&self, operation: Operation, kind: ServiceErrorKind, count: usize) {
        if count == 0 {
            return;
        }
        self.state.write().await.faults.push(Fault {
            operation,
            kind,
            remaining: Some(count),
        });
    }

    /// Fail every call to `operation` with `kind` until cleared
    pub async fn fail_always(&self, operation: Operation, kind: ServiceErrorKind) {
        self.state.write().await.faults.push(Fault {
            operation,
            kind,
            remaining: None,
        });
    }

    /// Remove all injected faults
    pub async fn clear_faults(&self) {
        self.state.write().await.faults.clear();
    }

    /// Every call attempted so far
    pub async fn journal(&self) -> Vec<Call> {
        self.state.read().await.journal.clone()
    }

    /// Forget the journal, keeping state
    pub async fn clear_journal(&self) {
        self.state.write().await.journal.clear();
    }

    /// Operations attempted so far, in order
    pub async fn operations(&self) -> Vec<Operation> {
        self.state
            .read()
            .await
            .journal
            .iter()
            .map(|c| c.operation)
            .collect()
    }

    /// Current status of a certificate
    pub async fn certificate_status(&self, certificate: &CertificateId) -> Option<CertificateStatus> {
        self.state
            .read()
            .await
            .certificates
            .get(certificate)
            .map(|c| c.status)
    }

    /// Document of a policy, if present
    pub async fn policy(&self, policy: &PolicyName) -> Option<PolicyDocument> {
        self.state
            .read()
            .await
            .policies
            .get(policy)
            .map(|p| p.document.clone())
    }

    /// Attachments of a policy (empty if absent)
    pub async fn policy_targets(&self, policy: &PolicyName) -> Vec<Principal> {
        self.state
            .read()
            .await
            .policies
            .get(policy)
            .map(|p| p.targets.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Names of every stored policy
    pub async fn policy_names(&self) -> Vec<PolicyName> {
        self.state.read().await.policies.keys().cloned().collect()
    }

    /// Every policy attached to `principal`
    pub async fn policies_attached_to(&self, principal: &Principal) -> Vec<PolicyName> {
        self.state
            .read()
            .await
            .policies
            .iter()
            .filter(|(_, p)| p.targets.contains(principal))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Principals bound to a record, `None` if the record is absent
    pub async fn thing_principals(&self, thing: &DeviceId) -> Option<Vec<Principal>> {
        self.state
            .read()
            .await
            .things
            .get(thing)
            .map(|p| p.iter().cloned().collect())
    }
}

#[async_trait]
impl CredentialEffects for MemoryControlPlane {
    async fn describe_certificate(
        &self,
        certificate: &CertificateId,
    ) -> Result<CertificateDescription, ServiceError> {
        let mut state = self.state.write().await;
        state.record(Operation::DescribeCertificate, certificate, None)?;
        match state.certificates.get(certificate).cloned() {
            Some(stored) => Ok(CertificateDescription {
                certificate_id: certificate.clone(),
                certificate_arn: Some(self.account.certificate_arn(certificate)),
                status: stored.status,
                certificate_pem: stored.pem,
            }),
            None => fail!(
                state,
                ServiceError::not_found("DescribeCertificate", certificate.to_string())
            ),
        }
    }

    async fn update_certificate_status(
        &self,
        certificate: &CertificateId,
        status: CertificateStatus,
    ) -> Result<(), ServiceError> {
        let mut state = self.state.write().await;
        state.record(
            Operation::UpdateCertificate,
            certificate,
            Some(status.to_string()),
        )?;
        match state.certificates.get_mut(certificate) {
            Some(stored) if stored.status.can_transition_to(status) => {
                stored.status = status;
                Ok(())
            }
            Some(stored) => {
                let message = format!(
                    "certificate {certificate} cannot move from {} to {status}",
                    stored.status
                );
                fail!(state, ServiceError::other("UpdateCertificate", message))
            }
            None => fail!(
                state,
                ServiceError::not_found("UpdateCertificate", certificate.to_string())
            ),
        }
    }

    async fn create_keys_and_certificate(
        &self,
        set_as_active: bool,
    ) -> Result<IssuedCredential, ServiceError> {
        let mut state = self.state.write().await;
        state.issued += 1;
        let id = format!("{:064x}", state.issued);
        state.record(Operation::CreateKeysAndCertificate, &id, None)?;
        let minted = fixtures::device_certificate(&issued_common_name(state.issued));

        let certificate_id = CertificateId::new(id)
            .map_err(|e| ServiceError::other("CreateKeysAndCertificate", e.to_string()))?;
        let status = if set_as_active {
            CertificateStatus::Active
        } else {
            CertificateStatus::Inactive
        };
        state.certificates.insert(
            certificate_id.clone(),
            StoredCertificate {
                status,
                pem: Some(minted.certificate_pem.clone()),
            },
        );

        Ok(IssuedCredential {
            certificate_arn: self.account.certificate_arn(&certificate_id),
            certificate_id,
            certificate_pem: minted.certificate_pem,
            key_pair: minted.key_pair,
        })
    }
}

#[async_trait]
impl PolicyEffects for MemoryControlPlane {
    async fn list_targets_for_policy(
        &self,
        policy: &PolicyName,
    ) -> Result<Vec<Principal>, ServiceError> {
        let mut state = self.state.write().await;
        state.record(Operation::ListTargetsForPolicy, policy, None)?;
        match state.policies.get(policy) {
            Some(stored) => Ok(stored.targets.iter().cloned().collect()),
            None => fail!(
                state,
                ServiceError::not_found("ListTargetsForPolicy", policy.to_string())
            ),
        }
    }

    async fn attach_policy(
        &self,
        policy: &PolicyName,
        target: &Principal,
    ) -> Result<(), ServiceError> {
        let mut state = self.state.write().await;
        state.record(Operation::AttachPolicy, policy, Some(target.to_string()))?;
        match state.policies.get_mut(policy) {
            Some(stored) => {
                stored.targets.insert(target.clone());
                Ok(())
            }
            None => fail!(
                state,
                ServiceError::not_found("AttachPolicy", policy.to_string())
            ),
        }
    }

    async fn detach_policy(
        &self,
        policy: &PolicyName,
        target: &Principal,
    ) -> Result<(), ServiceError> {
        let mut state = self.state.write().await;
        state.record(Operation::DetachPolicy, policy, Some(target.to_string()))?;
        match state.policies.get_mut(policy) {
            Some(stored) => {
                stored.targets.remove(target);
                Ok(())
            }
            None => fail!(
                state,
                ServiceError::not_found("DetachPolicy", policy.to_string())
            ),
        }
    }

    async fn delete_policy(&self, policy: &PolicyName) -> Result<(), ServiceError> {
        let mut state = self.state.write().await;
        state.record(Operation::DeletePolicy, policy, None)?;
        let attached = match state.policies.get(policy) {
            Some(stored) => stored.targets.len(),
            None => fail!(
                state,
                ServiceError::not_found("DeletePolicy", policy.to_string())
            ),
        };
        if attached > 0 {
            fail!(
                state,
                ServiceError::other(
                    "DeletePolicy",
                    format!("{policy} is still attached to {attached} target(s)")
                )
            );
        }
        state.policies.remove(policy);
        Ok(())
    }

    async fn create_policy(
        &self,
        policy: &PolicyName,
        document: &PolicyDocument,
    ) -> Result<(), ServiceError> {
        let mut state = self.state.write().await;
        state.record(Operation::CreatePolicy, policy, None)?;
        if state.policies.contains_key(policy) {
            fail!(
                state,
                ServiceError::already_exists("CreatePolicy", policy.to_string())
            );
        }
        state.policies.insert(
            policy.clone(),
            StoredPolicy {
                document: document.clone(),
                targets: BTreeSet::new(),
            },
        );
        Ok(())
    }
}

#[async_trait]
impl ThingRegistryEffects for MemoryControlPlane {
    async fn create_thing(&self, thing: &DeviceId) -> Result<(), ServiceError> {
        let mut state = self.state.write().await;
        state.record(Operation::CreateThing, thing, None)?;
        if state.things.contains_key(thing) {
            fail!(
                state,
                ServiceError::already_exists("CreateThing", thing.to_string())
            );
        }
        state.things.insert(thing.clone(), BTreeSet::new());
        Ok(())
    }

    async fn describe_thing(&self, thing: &DeviceId) -> Result<ThingDescription, ServiceError> {
        let mut state = self.state.write().await;
        state.record(Operation::DescribeThing, thing, None)?;
        if !state.things.contains_key(thing) {
            fail!(
                state,
                ServiceError::not_found("DescribeThing", thing.to_string())
            );
        }
        Ok(ThingDescription {
            thing_name: thing.clone(),
            thing_arn: Some(format!(
                "arn:aws:iot:{}:{}:thing/{thing}",
                self.account.region, self.account.account_id
            )),
        })
    }

    async fn attach_thing_principal(
        &self,
        thing: &DeviceId,
        principal: &Principal,
    ) -> Result<(), ServiceError> {
        let mut state = self.state.write().await;
        state.record(
            Operation::AttachThingPrincipal,
            thing,
            Some(principal.to_string()),
        )?;
        let inserted = match state.things.get_mut(thing) {
            Some(principals) => principals.insert(principal.clone()),
            None => fail!(
                state,
                ServiceError::not_found("AttachThingPrincipal", thing.to_string())
            ),
        };
        if !inserted {
            fail!(
                state,
                ServiceError::already_exists(
                    "AttachThingPrincipal",
                    format!("{principal} is already bound to {thing}")
                )
            );
        }
        Ok(())
    }

    async fn list_thing_principals(
        &self,
        thing: &DeviceId,
    ) -> Result<Vec<Principal>, ServiceError> {
        let mut state = self.state.write().await;
        state.record(Operation::ListThingPrincipals, thing, None)?;
        match state.things.get(thing) {
            Some(principals) => Ok(principals.iter().cloned().collect()),
            None => fail!(
                state,
                ServiceError::not_found("ListThingPrincipals", thing.to_string())
            ),
        }
    }

    async fn detach_thing_principal(
        &self,
        thing: &DeviceId,
        principal: &Principal,
    ) -> Result<(), ServiceError> {
        let mut state = self.state.write().await;
        state.record(
            Operation::DetachThingPrincipal,
            thing,
            Some(principal.to_string()),
        )?;
        let removed = match state.things.get_mut(thing) {
            Some(principals) => principals.remove(principal),
            None => fail!(
                state,
                ServiceError::not_found("DetachThingPrincipal", thing.to_string())
            ),
        };
        if !removed {
            fail!(
                state,
                ServiceError::not_found(
                    "DetachThingPrincipal",
                    format!("{principal} is not bound to {thing}")
                )
            );
        }
        Ok(())
    }

    async fn delete_thing(&self, thing: &DeviceId) -> Result<(), ServiceError> {
        let mut state = self.state.write().await;
        state.record(Operation::DeleteThing, thing, None)?;
        let bound = match state.things.get(thing) {
            Some(principals) => principals.len(),
            None => fail!(
                state,
                ServiceError::not_found("DeleteThing", thing.to_string())
            ),
        };
        if bound > 0 {
            fail!(
                state,
                ServiceError::other(
                    "DeleteThing",
                    format!("{thing} still has {bound} principal(s)")
                )
            );
        }
        state.things.remove(thing);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jitp_core::types::BootstrapScope;

    fn name(s: &str) -> PolicyName {
        PolicyName::new(s).unwrap()
    }

    fn principal(s: &str) -> Principal {
        Principal::new(s).unwrap()
    }

    #[tokio::test]
    async fn attached_policy_cannot_be_deleted() {
        let cp = MemoryControlPlane::default();
        let policy = name("p");
        cp.insert_policy(
            &policy,
            PolicyDocument::bootstrap(BootstrapScope::Open),
            [principal("arn:a")],
        )
        .await;

        let err = cp.delete_policy(&policy).await.unwrap_err();
        assert_eq!(err.kind(), ServiceErrorKind::Other);

        cp.detach_policy(&policy, &principal("arn:a")).await.unwrap();
        cp.delete_policy(&policy).await.unwrap();
        assert!(cp.policy(&policy).await.is_none());
        assert!(cp.delete_policy(&policy).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn one_shot_faults_expire() {
        let cp = MemoryControlPlane::default();
        let thing = DeviceId::new("d").unwrap();
        cp.fail_next(Operation::CreateThing, ServiceErrorKind::Throttled, 1)
            .await;

        let err = cp.create_thing(&thing).await.unwrap_err();
        assert_eq!(err.kind(), ServiceErrorKind::Throttled);
        cp.create_thing(&thing).await.unwrap();

        let journal = cp.journal().await;
        assert_eq!(journal.len(), 2);
        assert!(journal[0].failed);
        assert!(!journal[1].failed);
    }

    #[tokio::test]
    async fn duplicate_binding_is_already_exists() {
        let cp = MemoryControlPlane::default();
        let thing = DeviceId::new("d").unwrap();
        cp.create_thing(&thing).await.unwrap();
        cp.attach_thing_principal(&thing, &principal("arn:a"))
            .await
            .unwrap();
        let err = cp
            .attach_thing_principal(&thing, &principal("arn:a"))
            .await
            .unwrap_err();
        assert!(err.is_already_exists());
        assert!(cp.create_thing(&thing).await.unwrap_err().is_already_exists());
    }

    #[tokio::test]
    async fn issued_certificates_are_stored() {
        let cp = MemoryControlPlane::default();
        let issued = cp.create_keys_and_certificate(true).await.unwrap();
        assert_eq!(
            cp.certificate_status(&issued.certificate_id).await,
            Some(CertificateStatus::Active)
        );
        assert!(issued.certificate_pem.contains("BEGIN CERTIFICATE"));
        assert_eq!(
            issued.certificate_arn,
            cp.account().certificate_arn(&issued.certificate_id)
        );
    }
}
