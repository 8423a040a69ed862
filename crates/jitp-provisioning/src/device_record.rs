//! Device record provisioning and teardown.

use jitp_core::effects::ThingRegistryEffects;
use jitp_core::{DeviceId, JitpError, JitpResult, Principal};
use std::sync::Arc;
use tracing::{debug, info};

/// Creates device records, binds principals to them, and tears them down.
#[derive(Debug)]
pub struct DeviceRecordProvisioner<R> {
    registry: Arc<R>,
}

impl<R> Clone for DeviceRecordProvisioner<R> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<R: ThingRegistryEffects> DeviceRecordProvisioner<R> {
    /// Create a provisioner over a device registry
    pub fn new(registry: Arc<R>) -> Self {
        Self { registry }
    }

    /// Ensure record `device` exists with `principal` bound to it.
    ///
    /// An existing record or an existing binding counts as success.
    pub async fn provision(&self, device: &DeviceId, principal: &Principal) -> JitpResult<()> {
        match self.registry.create_thing(device).await {
            Ok(()) => debug!(thing = %device, "created device record"),
            Err(err) if err.is_already_exists() => {
                debug!(thing = %device, "device record already exists");
            }
            Err(err) => return Err(err.into()),
        }

        match self.registry.attach_thing_principal(device, principal).await {
            Ok(()) => {}
            Err(err) if err.is_already_exists() => {
                debug!(thing = %device, principal = %principal, "principal already bound");
            }
            Err(err) => return Err(err.into()),
        }

        info!(thing = %device, principal = %principal, "device record provisioned");
        Ok(())
    }

    /// Unbind every principal from record `device`, then delete it.
    ///
    /// Fails with `RecordNotFound` if the record does not exist. If the final
    /// delete fails the principals stay unbound; rerunning the whole call is
    /// safe. Returns the principals that were bound.
    pub async fn deprovision(&self, device: &DeviceId) -> JitpResult<Vec<Principal>> {
        match self.registry.describe_thing(device).await {
            Ok(_) => {}
            Err(err) if err.is_not_found() => {
                return Err(JitpError::record_not_found(device.as_str()));
            }
            Err(err) => return Err(err.into()),
        }

        let principals = self.registry.list_thing_principals(device).await?;
        debug!(thing = %device, count = principals.len(), "unbinding principals");

        for principal in &principals {
            match self.registry.detach_thing_principal(device, principal).await {
                Ok(()) => {}
                Err(err) if err.is_not_found() => {
                    debug!(thing = %device, principal = %principal, "principal already unbound");
                }
                Err(err) => return Err(err.into()),
            }
        }

        match self.registry.delete_thing(device).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                debug!(thing = %device, "device record already deleted");
            }
            Err(err) => return Err(err.into()),
        }

        info!(thing = %device, unbound = principals.len(), "device record deleted");
        Ok(principals)
    }
}
