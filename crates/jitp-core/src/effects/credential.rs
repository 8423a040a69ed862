//! Certificate lifecycle operations.

use crate::errors::ServiceError;
use crate::types::{CertificateDescription, CertificateId, CertificateStatus, IssuedCredential};
use async_trait::async_trait;

/// Certificate status and body storage in the control plane.
#[async_trait]
pub trait CredentialEffects: Send + Sync {
    /// Read status and PEM body of a certificate.
    async fn describe_certificate(
        &self,
        certificate: &CertificateId,
    ) -> Result<CertificateDescription, ServiceError>;

    /// Move a certificate to `status`. Setting the current status again is a no-op.
    async fn update_certificate_status(
        &self,
        certificate: &CertificateId,
        status: CertificateStatus,
    ) -> Result<(), ServiceError>;

    /// Mint a new key pair and certificate.
    async fn create_keys_and_certificate(
        &self,
        set_as_active: bool,
    ) -> Result<IssuedCredential, ServiceError>;
}
