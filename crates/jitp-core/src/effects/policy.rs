//! Named policy storage and policy attachments.
//!
//! Attachment is a relation between a policy name and a principal, not an
//! attribute of the policy. A policy cannot be deleted while attached, and
//! documents cannot be edited in place.

use crate::errors::ServiceError;
use crate::types::{PolicyDocument, PolicyName, Principal};
use async_trait::async_trait;

/// Policy store of the control plane.
#[async_trait]
pub trait PolicyEffects: Send + Sync {
    /// Principals the policy is attached to. `NotFound` if the policy is absent.
    async fn list_targets_for_policy(
        &self,
        policy: &PolicyName,
    ) -> Result<Vec<Principal>, ServiceError>;

    /// Attach a policy to a principal.
    async fn attach_policy(&self, policy: &PolicyName, target: &Principal)
        -> Result<(), ServiceError>;

    /// Detach a policy from a principal.
    async fn detach_policy(&self, policy: &PolicyName, target: &Principal)
        -> Result<(), ServiceError>;

    /// Delete a policy. Fails while any attachment remains.
    async fn delete_policy(&self, policy: &PolicyName) -> Result<(), ServiceError>;

    /// Create a policy. `AlreadyExists` if the name is taken.
    async fn create_policy(
        &self,
        policy: &PolicyName,
        document: &PolicyDocument,
    ) -> Result<(), ServiceError>;
}
