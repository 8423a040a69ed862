//! Device identity extraction from certificate bodies.

use jitp_core::{DeviceId, JitpError, JitpResult};
use x509_parser::pem::parse_x509_pem;

/// Derives a device identity from the subject common name of a certificate.
///
/// Pure: no collaborator is consulted.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityExtractor;

impl IdentityExtractor {
    /// Parse `certificate_pem` and return its subject CN as a [`DeviceId`].
    ///
    /// Fails with `MalformedCredential` if the body is not a PEM encoded X.509
    /// certificate, and with `MissingIdentity` if the subject has no common
    /// name usable as a device record name. When several CNs are present the
    /// first one wins.
    pub fn extract(certificate_pem: &str) -> JitpResult<DeviceId> {
        let (_, pem) = parse_x509_pem(certificate_pem.as_bytes())
            .map_err(|e| JitpError::malformed_credential(format!("not a PEM document: {e}")))?;

        let certificate = pem.parse_x509().map_err(|e| {
            JitpError::malformed_credential(format!("not an X.509 certificate: {e}"))
        })?;

        let common_name = certificate
            .subject()
            .iter_common_name()
            .next()
            .ok_or_else(|| JitpError::missing_identity("certificate subject has no common name"))?;

        let value = common_name.as_str().map_err(|e| {
            JitpError::malformed_credential(format!("common name is not a string: {e}"))
        })?;

        if value.trim().is_empty() {
            return Err(JitpError::missing_identity("certificate common name is empty"));
        }
        DeviceId::new(value).map_err(|e| {
            JitpError::missing_identity(format!("common name is not a device id: {e}"))
        })
    }
}
