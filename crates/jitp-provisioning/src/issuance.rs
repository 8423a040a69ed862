//! Bootstrap credential issuance.
//!
//! A fresh certificate gets a temporary policy named after the certificate,
//! since the device it will belong to is not known until first connection.
//! The activation workflow retires that policy once identity is resolved.

use jitp_core::effects::{CredentialEffects, PolicyEffects};
use jitp_core::types::{BootstrapScope, IssuedCredential};
use jitp_core::{CertificateStatus, JitpResult, PolicyDocument, PolicyName};
use std::sync::Arc;
use tracing::{info, warn};

/// Issues certificates with a bootstrap policy attached.
pub struct BootstrapIssuer<C> {
    control_plane: Arc<C>,
    scope: BootstrapScope,
}

impl<C: CredentialEffects + PolicyEffects> BootstrapIssuer<C> {
    /// Issue through `control_plane` with the given bootstrap breadth
    pub fn new(control_plane: Arc<C>, scope: BootstrapScope) -> Self {
        Self {
            control_plane,
            scope,
        }
    }

    /// Create keys and an active certificate carrying the bootstrap policy.
    pub async fn issue(&self) -> JitpResult<IssuedCredential> {
        if self.scope == BootstrapScope::Open {
            warn!(
                "bootstrap policy grants connect/publish/subscribe/receive on every resource \
                 until the device completes activation"
            );
        }

        let issued = self.control_plane.create_keys_and_certificate(true).await?;
        let policy = PolicyName::bootstrap(&issued.certificate_id);

        self.control_plane
            .create_policy(&policy, &PolicyDocument::bootstrap(self.scope))
            .await?;
        self.control_plane
            .attach_policy(&policy, &issued.certificate_arn)
            .await?;
        self.control_plane
            .update_certificate_status(&issued.certificate_id, CertificateStatus::Active)
            .await?;

        info!(
            certificate = %issued.certificate_id,
            policy = %policy,
            "issued bootstrap credential"
        );
        Ok(issued)
    }
}
