//! Idempotent replacement of a named access policy.
//!
//! Documents cannot be edited in place and a policy cannot be deleted while
//! attached, so replacement is detach → delete → create → attach. Every step
//! tolerates the state a crashed earlier run may have left behind: a missing
//! policy or attachment is the expected "already done" signal, not an error.
//! Any other failure aborts the rotation and is returned unchanged; the run
//! is retried as a whole by the trigger system.

use jitp_core::effects::PolicyEffects;
use jitp_core::{JitpResult, PolicyDocument, PolicyName, Principal, ServiceError};
use std::sync::Arc;
use tracing::{debug, info};

/// What [`PolicyRotator::retire`] removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Retirement {
    /// Principals the policy was detached from
    pub detached: Vec<Principal>,
    /// Whether this run deleted the policy (false if it was already absent)
    pub deleted: bool,
}

/// Swallow `NotFound`, pass everything else through.
fn absent_ok<T>(result: Result<T, ServiceError>) -> Result<Option<T>, ServiceError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}

/// Replaces named policies on the policy store.
#[derive(Debug)]
pub struct PolicyRotator<P> {
    policies: Arc<P>,
}

impl<P> Clone for PolicyRotator<P> {
    fn clone(&self) -> Self {
        Self {
            policies: Arc::clone(&self.policies),
        }
    }
}

impl<P: PolicyEffects> PolicyRotator<P> {
    /// Create a rotator over a policy store
    pub fn new(policies: Arc<P>) -> Self {
        Self { policies }
    }

    /// Detach `policy` from all its targets and delete it.
    ///
    /// A policy that does not exist, or disappears part way, is not an error.
    pub async fn retire(&self, policy: &PolicyName) -> JitpResult<Retirement> {
        let targets = match absent_ok(self.policies.list_targets_for_policy(policy).await)? {
            Some(targets) => targets,
            None => {
                debug!(policy = %policy, "policy has no targets listing, treating as unattached");
                Vec::new()
            }
        };

        let mut detached = Vec::with_capacity(targets.len());
        for target in targets {
            if absent_ok(self.policies.detach_policy(policy, &target).await)?.is_some() {
                debug!(policy = %policy, target = %target, "detached policy");
                detached.push(target);
            }
        }

        let deleted = absent_ok(self.policies.delete_policy(policy).await)?.is_some();
        if deleted {
            debug!(policy = %policy, detached = detached.len(), "deleted policy");
        } else {
            debug!(policy = %policy, "policy already absent");
        }

        Ok(Retirement { detached, deleted })
    }

    /// Replace `policy` with `document` and attach it to `target`.
    ///
    /// The new document is attached only after the previous one has been
    /// detached from everything and deleted.
    pub async fn rotate(
        &self,
        policy: &PolicyName,
        document: &PolicyDocument,
        target: &Principal,
    ) -> JitpResult<Retirement> {
        let retirement = self.retire(policy).await?;

        self.policies.create_policy(policy, document).await?;
        self.policies.attach_policy(policy, target).await?;

        info!(
            policy = %policy,
            target = %target,
            replaced = retirement.deleted,
            "policy rotated"
        );
        Ok(retirement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use jitp_core::types::BootstrapScope;
    use jitp_core::{AccountContext, DeviceId, JitpError, ServiceErrorKind};
    use jitp_testkit::{MemoryControlPlane, Operation};

    struct Fixture {
        control_plane: Arc<MemoryControlPlane>,
        rotator: PolicyRotator<MemoryControlPlane>,
        policy: PolicyName,
        document: PolicyDocument,
        target: Principal,
    }

    fn fixture() -> Fixture {
        let account = AccountContext::new("us-east-2", "111");
        let control_plane = Arc::new(MemoryControlPlane::new(account.clone()));
        let device = DeviceId::new("dev-42").unwrap();
        Fixture {
            rotator: PolicyRotator::new(Arc::clone(&control_plane)),
            control_plane,
            policy: PolicyName::for_device(&device),
            document: PolicyDocument::device_scoped(&account, &device),
            target: Principal::new("arn:aws:iot:us-east-2:111:cert/c1").unwrap(),
        }
    }

    #[tokio::test]
    async fn rotation_from_nothing_attaches_new_policy() {
        let f = fixture();

        let retirement = f.rotator.rotate(&f.policy, &f.document, &f.target).await.unwrap();

        assert_eq!(retirement, Retirement::default());
        assert_eq!(f.control_plane.policy(&f.policy).await, Some(f.document.clone()));
        assert_eq!(f.control_plane.policy_targets(&f.policy).await, vec![f.target.clone()]);
    }

    #[tokio::test]
    async fn rotation_replaces_existing_attachments() {
        let f = fixture();
        let stale = Principal::new("arn:aws:iot:us-east-2:111:cert/old").unwrap();
        f.control_plane
            .insert_policy(
                &f.policy,
                PolicyDocument::bootstrap(BootstrapScope::Open),
                [stale.clone(), f.target.clone()],
            )
            .await;

        let retirement = f.rotator.rotate(&f.policy, &f.document, &f.target).await.unwrap();

        assert!(retirement.deleted);
        assert_eq!(retirement.detached.len(), 2);
        assert_eq!(f.control_plane.policy(&f.policy).await, Some(f.document.clone()));
        assert_eq!(f.control_plane.policy_targets(&f.policy).await, vec![f.target.clone()]);
    }

    #[tokio::test]
    async fn new_policy_attached_only_after_old_is_gone() {
        let f = fixture();
        f.control_plane
            .insert_policy(
                &f.policy,
                PolicyDocument::bootstrap(BootstrapScope::Open),
                [f.target.clone()],
            )
            .await;

        f.rotator.rotate(&f.policy, &f.document, &f.target).await.unwrap();

        assert_eq!(
            f.control_plane.operations().await,
            vec![
                Operation::ListTargetsForPolicy,
                Operation::DetachPolicy,
                Operation::DeletePolicy,
                Operation::CreatePolicy,
                Operation::AttachPolicy,
            ]
        );
    }

    #[tokio::test]
    async fn retry_after_crash_between_detach_and_delete() {
        let f = fixture();
        f.control_plane
            .insert_policy(
                &f.policy,
                PolicyDocument::bootstrap(BootstrapScope::Open),
                [f.target.clone()],
            )
            .await;
        f.control_plane
            .fail_next(Operation::DeletePolicy, ServiceErrorKind::Unavailable, 1)
            .await;

        let err = f.rotator.rotate(&f.policy, &f.document, &f.target).await.unwrap_err();
        assert_eq!(err.kind(), jitp_core::ErrorKind::Remote(ServiceErrorKind::Unavailable));
        // Old document is still present, detached, and nothing new was attached.
        assert!(f.control_plane.policy_targets(&f.policy).await.is_empty());
        assert_ne!(f.control_plane.policy(&f.policy).await, Some(f.document.clone()));

        f.rotator.rotate(&f.policy, &f.document, &f.target).await.unwrap();
        assert_eq!(f.control_plane.policy(&f.policy).await, Some(f.document.clone()));
        assert_eq!(f.control_plane.policy_targets(&f.policy).await, vec![f.target.clone()]);
    }

    #[tokio::test]
    async fn retry_after_crash_between_delete_and_create() {
        let f = fixture();
        f.control_plane
            .fail_next(Operation::CreatePolicy, ServiceErrorKind::Throttled, 1)
            .await;

        assert!(f.rotator.rotate(&f.policy, &f.document, &f.target).await.is_err());
        assert!(f.control_plane.policy(&f.policy).await.is_none());

        f.rotator.rotate(&f.policy, &f.document, &f.target).await.unwrap();
        assert_eq!(f.control_plane.policy_targets(&f.policy).await, vec![f.target.clone()]);
    }

    #[tokio::test]
    async fn swallowed_detach_not_found_still_blocks_delete() {
        let f = fixture();
        f.control_plane
            .insert_policy(&f.policy, f.document.clone(), [f.target.clone()])
            .await;
        f.control_plane
            .fail_next(Operation::DetachPolicy, ServiceErrorKind::NotFound, 1)
            .await;

        let retirement = f.rotator.retire(&f.policy).await;
        // The NotFound is swallowed, but the attachment is still there.
        assert_matches!(retirement, Err(JitpError::Remote(e)) if e.kind() == ServiceErrorKind::Other);
        assert_eq!(
            f.control_plane.operations().await,
            vec![
                Operation::ListTargetsForPolicy,
                Operation::DetachPolicy,
                Operation::DeletePolicy,
            ]
        );
    }

    #[tokio::test]
    async fn non_not_found_failures_abort_before_mutation() {
        let f = fixture();
        f.control_plane
            .insert_policy(
                &f.policy,
                PolicyDocument::bootstrap(BootstrapScope::Open),
                [f.target.clone()],
            )
            .await;
        f.control_plane
            .fail_next(Operation::ListTargetsForPolicy, ServiceErrorKind::Other, 1)
            .await;

        let err = f.rotator.rotate(&f.policy, &f.document, &f.target).await.unwrap_err();

        assert_eq!(err.kind(), jitp_core::ErrorKind::Remote(ServiceErrorKind::Other));
        assert_eq!(f.control_plane.operations().await, vec![Operation::ListTargetsForPolicy]);
        assert_eq!(f.control_plane.policy_targets(&f.policy).await, vec![f.target.clone()]);
    }

    #[tokio::test]
    async fn retiring_an_absent_policy_is_a_no_op() {
        let f = fixture();
        let retirement = f.rotator.retire(&f.policy).await.unwrap();
        assert_eq!(retirement, Retirement::default());
        assert_eq!(
            f.control_plane.operations().await,
            vec![Operation::ListTargetsForPolicy, Operation::DeletePolicy]
        );
    }
}
