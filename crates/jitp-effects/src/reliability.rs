//! Call bounding for remote collaborators.
//!
//! [`CallBudget`] puts a timeout on every attempt and retries only the
//! transient kinds (throttled, timed out, unavailable) a fixed number of
//! times with exponential backoff. [`BoundedControlPlane`] applies one budget
//! to every method of the handler it wraps. Not-found and already-exists
//! results are answers, not failures, and are never retried.

use async_trait::async_trait;
use jitp_core::effects::{
    ArchiveEffects, CredentialEffects, InvocationEffects, PolicyEffects, ThingRegistryEffects,
};
use jitp_core::types::{
    CertificateDescription, CertificateId, CertificateStatus, DeviceId, IssuedCredential,
    PolicyDocument, PolicyName, Principal, ThingDescription,
};
use jitp_core::{JitpConfig, ServiceError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Timeout and retry bounds for a single remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallBudget {
    /// Bound on each attempt
    pub timeout: Duration,
    /// Extra attempts after a transient failure (0 = none)
    pub transient_retries: u32,
    /// Delay before the first retry; doubles each time
    pub initial_backoff: Duration,
    /// Cap on the retry delay
    pub max_backoff: Duration,
}

impl Default for CallBudget {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            transient_retries: 0,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl CallBudget {
    /// Budget from the `[remote]` configuration table
    pub fn from_config(config: &JitpConfig) -> Self {
        Self {
            timeout: config.call_timeout(),
            transient_retries: config.remote.transient_retries,
            ..Self::default()
        }
    }

    /// Set the per-attempt timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the number of transient retries
    pub fn with_transient_retries(mut self, retries: u32) -> Self {
        self.transient_retries = retries;
        self
    }

    /// Set the initial backoff
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Run `call` under this budget.
    pub async fn run<F, Fut, T>(&self, operation: &str, mut call: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let mut attempt = 0;
        loop {
            let error = match tokio::time::timeout(self.timeout, call()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(error)) => error,
                Err(_) => ServiceError::timeout(
                    operation,
                    format!("no response within {}ms", self.timeout.as_millis()),
                ),
            };

            if !error.kind().is_transient() || attempt >= self.transient_retries {
                return Err(error);
            }

            let delay = self.backoff(attempt);
            warn!(
                operation,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "transient failure, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Any handler with a [`CallBudget`] applied to every call
#[derive(Debug)]
pub struct BoundedControlPlane<H> {
    inner: Arc<H>,
    budget: CallBudget,
}

impl<H> BoundedControlPlane<H> {
    /// Wrap `inner`
    pub fn new(inner: Arc<H>, budget: CallBudget) -> Self {
        Self { inner, budget }
    }

    /// The wrapped handler
    pub fn inner(&self) -> &Arc<H> {
        &self.inner
    }

    /// The budget in force
    pub fn budget(&self) -> CallBudget {
        self.budget
    }
}

#[async_trait]
impl<H: CredentialEffects> CredentialEffects for BoundedControlPlane<H> {
    async fn describe_certificate(
        &self,
        certificate: &CertificateId,
    ) -> Result<CertificateDescription, ServiceError> {
        self.budget
            .run("DescribeCertificate", || {
                self.inner.describe_certificate(certificate)
            })
            .await
    }

    async fn update_certificate_status(
        &self,
        certificate: &CertificateId,
        status: CertificateStatus,
    ) -> Result<(), ServiceError> {
        self.budget
            .run("UpdateCertificate", || {
                self.inner.update_certificate_status(certificate, status)
            })
            .await
    }

    async fn create_keys_and_certificate(
        &self,
        set_as_active: bool,
    ) -> Result<IssuedCredential, ServiceError> {
        self.budget
            .run("CreateKeysAndCertificate", || {
                self.inner.create_keys_and_certificate(set_as_active)
            })
            .await
    }
}

#[async_trait]
impl<H: PolicyEffects> PolicyEffects for BoundedControlPlane<H> {
    async fn list_targets_for_policy(
        &self,
        policy: &PolicyName,
    ) -> Result<Vec<Principal>, ServiceError> {
        self.budget
            .run("ListTargetsForPolicy", || {
                self.inner.list_targets_for_policy(policy)
            })
            .await
    }

    async fn attach_policy(
        &self,
        policy: &PolicyName,
        target: &Principal,
    ) -> Result<(), ServiceError> {
        self.budget
            .run("AttachPolicy", || self.inner.attach_policy(policy, target))
            .await
    }

    async fn detach_policy(
        &self,
        policy: &PolicyName,
        target: &Principal,
    ) -> Result<(), ServiceError> {
        self.budget
            .run("DetachPolicy", || self.inner.detach_policy(policy, target))
            .await
    }

    async fn delete_policy(&self, policy: &PolicyName) -> Result<(), ServiceError> {
        self.budget
            .run("DeletePolicy", || self.inner.delete_policy(policy))
            .await
    }

    async fn create_policy(
        &self,
        policy: &PolicyName,
        document: &PolicyDocument,
    ) -> Result<(), ServiceError> {
        self.budget
            .run("CreatePolicy", || self.inner.create_policy(policy, document))
            .await
    }
}

#[async_trait]
impl<H: ThingRegistryEffects> ThingRegistryEffects for BoundedControlPlane<H> {
    async fn create_thing(&self, thing: &DeviceId) -> Result<(), ServiceError> {
        self.budget
            .run("CreateThing", || self.inner.create_thing(thing))
            .await
    }

    async fn describe_thing(&self, thing: &DeviceId) -> Result<ThingDescription, ServiceError> {
        self.budget
            .run("DescribeThing", || self.inner.describe_thing(thing))
            .await
    }

    async fn attach_thing_principal(
        &self,
        thing: &DeviceId,
        principal: &Principal,
    ) -> Result<(), ServiceError> {
        self.budget
            .run("AttachThingPrincipal", || {
                self.inner.attach_thing_principal(thing, principal)
            })
            .await
    }

    async fn list_thing_principals(
        &self,
        thing: &DeviceId,
    ) -> Result<Vec<Principal>, ServiceError> {
        self.budget
            .run("ListThingPrincipals", || {
                self.inner.list_thing_principals(thing)
            })
            .await
    }

    async fn detach_thing_principal(
        &self,
        thing: &DeviceId,
        principal: &Principal,
    ) -> Result<(), ServiceError> {
        self.budget
            .run("DetachThingPrincipal", || {
                self.inner.detach_thing_principal(thing, principal)
            })
            .await
    }

    async fn delete_thing(&self, thing: &DeviceId) -> Result<(), ServiceError> {
        self.budget
            .run("DeleteThing", || self.inner.delete_thing(thing))
            .await
    }
}

#[async_trait]
impl<H: ArchiveEffects> ArchiveEffects for BoundedControlPlane<H> {
    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), ServiceError> {
        self.budget
            .run("PutObject", || self.inner.put_object(key, body.clone()))
            .await
    }
}

#[async_trait]
impl<H: InvocationEffects> InvocationEffects for BoundedControlPlane<H> {
    async fn invoke(&self, function: &str, payload: Vec<u8>) -> Result<Vec<u8>, ServiceError> {
        self.budget
            .run("Invoke", || self.inner.invoke(function, payload.clone()))
            .await
    }
}
