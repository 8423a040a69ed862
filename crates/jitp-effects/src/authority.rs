//! Device certificate authority
//!
//! A self-signed CA that signs device certificates with `CN=<deviceId>`, for
//! devices that connect with a certificate registered from outside instead of
//! one issued by the control plane. The CA is kept as two PEM files:
//! [`CA_CERTIFICATE_FILE`] and [`CA_KEY_FILE`].

use jitp_core::types::KeyPairPem;
use jitp_core::DeviceId;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose,
};

/// CA certificate file name
pub const CA_CERTIFICATE_FILE: &str = "root.cert";
/// CA private key file name
pub const CA_KEY_FILE: &str = "root.key";

/// Certificate authority failures
#[derive(Debug, thiserror::Error)]
pub enum AuthorityError {
    /// The CA certificate or key could not be used
    #[error("invalid CA material: {0}")]
    InvalidCa(String),

    /// Key generation or signing failed
    #[error("certificate generation failed: {0}")]
    Generation(#[from] rcgen::Error),
}

/// A device certificate signed by a [`CertificateAuthority`]
#[derive(Debug, Clone)]
pub struct DeviceCertificate {
    /// Identity in the subject CN
    pub device_id: DeviceId,
    /// PEM certificate body
    pub certificate_pem: String,
    /// Device key pair
    pub key_pair: KeyPairPem,
}

fn subject(common_name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CountryName, "US");
    dn.push(DnType::StateOrProvinceName, "NY");
    dn.push(DnType::OrganizationName, "MyCompany");
    dn.push(DnType::OrganizationalUnitName, "IoT");
    dn.push(DnType::CommonName, common_name);
    dn
}

/// CA certificate and signing key
pub struct CertificateAuthority {
    certificate_pem: String,
    certificate: Certificate,
    key_pair: KeyPair,
}

impl std::fmt::Debug for CertificateAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateAuthority")
            .field("certificate_pem", &self.certificate_pem)
            .field("key_pair", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl CertificateAuthority {
    /// Create a new CA with a fresh key
    pub fn generate(common_name: &str) -> Result<Self, AuthorityError> {
        let mut params = CertificateParams::new(Vec::<String>::new())?;
        params.distinguished_name = subject(common_name);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];

        let key_pair = KeyPair::generate()?;
        let certificate = params.self_signed(&key_pair)?;
        Ok(Self {
            certificate_pem: certificate.pem(),
            certificate,
            key_pair,
        })
    }

    /// Load a CA from its certificate and private key.
    ///
    /// The certificate must be a CA and the key must be the one it certifies.
    pub fn from_pem(certificate_pem: &str, private_key_pem: &str) -> Result<Self, AuthorityError> {
        let key_pair = KeyPair::from_pem(private_key_pem)
            .map_err(|e| AuthorityError::InvalidCa(format!("private key: {e}")))?;

        let (_, pem) = x509_parser::pem::parse_x509_pem(certificate_pem.as_bytes())
            .map_err(|e| AuthorityError::InvalidCa(format!("certificate: {e}")))?;
        let parsed = pem
            .parse_x509()
            .map_err(|e| AuthorityError::InvalidCa(format!("certificate: {e}")))?;
        if parsed.public_key().raw != key_pair.public_key_der().as_slice() {
            return Err(AuthorityError::InvalidCa(
                "private key does not match the certificate".to_string(),
            ));
        }

        let params = CertificateParams::from_ca_cert_pem(certificate_pem)
            .map_err(|e| AuthorityError::InvalidCa(format!("certificate: {e}")))?;
        if !matches!(params.is_ca, IsCa::Ca(_)) {
            return Err(AuthorityError::InvalidCa(
                "certificate is not a CA".to_string(),
            ));
        }

        // Signing only needs the issuer name and key, so a re-signed copy of
        // the stored certificate stands in for it.
        let certificate = params.self_signed(&key_pair)?;
        Ok(Self {
            certificate_pem: certificate_pem.trim().to_string(),
            certificate,
            key_pair,
        })
    }

    /// CA certificate as given to devices and the registry
    pub fn certificate_pem(&self) -> &str {
        &self.certificate_pem
    }

    /// CA private key
    pub fn private_key_pem(&self) -> String {
        self.key_pair.serialize_pem()
    }

    /// Sign a certificate for `device` with a fresh key pair
    pub fn issue(&self, device: &DeviceId) -> Result<DeviceCertificate, AuthorityError> {
        let mut params = CertificateParams::new(Vec::<String>::new())?;
        params.distinguished_name = subject(device.as_str());
        params.is_ca = IsCa::ExplicitNoCa;
        params.use_authority_key_identifier_extension = true;
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];

        let key_pair = KeyPair::generate()?;
        let certificate = params.signed_by(&key_pair, &self.certificate, &self.key_pair)?;
        tracing::debug!(device = %device, "device certificate signed");

        Ok(DeviceCertificate {
            device_id: device.clone(),
            certificate_pem: certificate.pem(),
            key_pair: KeyPairPem {
                private_key: key_pair.serialize_pem(),
                public_key: key_pair.public_key_pem(),
            },
        })
    }
}
