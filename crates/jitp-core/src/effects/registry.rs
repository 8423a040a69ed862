//! Device record ("Thing") registry operations.

use crate::errors::ServiceError;
use crate::types::{DeviceId, Principal, ThingDescription};
use async_trait::async_trait;

/// Device registry of the control plane.
#[async_trait]
pub trait ThingRegistryEffects: Send + Sync {
    /// Create a record. `AlreadyExists` if present.
    async fn create_thing(&self, thing: &DeviceId) -> Result<(), ServiceError>;

    /// Read a record. `NotFound` if absent.
    async fn describe_thing(&self, thing: &DeviceId) -> Result<ThingDescription, ServiceError>;

    /// Bind a principal to a record. `AlreadyExists` if already bound.
    async fn attach_thing_principal(
        &self,
        thing: &DeviceId,
        principal: &Principal,
    ) -> Result<(), ServiceError>;

    /// Principals bound to a record.
    async fn list_thing_principals(&self, thing: &DeviceId)
        -> Result<Vec<Principal>, ServiceError>;

    /// Unbind a principal from a record.
    async fn detach_thing_principal(
        &self,
        thing: &DeviceId,
        principal: &Principal,
    ) -> Result<(), ServiceError>;

    /// Delete a record.
    async fn delete_thing(&self, thing: &DeviceId) -> Result<(), ServiceError>;
}
