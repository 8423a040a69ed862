//! Certificate fixtures minted with `rcgen`.

use jitp_core::types::KeyPairPem;
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};

/// A freshly minted self-signed certificate and its keys.
#[derive(Debug, Clone)]
pub struct MintedCertificate {
    /// PEM certificate body
    pub certificate_pem: String,
    /// Key pair that signed it
    pub key_pair: KeyPairPem,
}

fn mint(distinguished_name: DistinguishedName) -> MintedCertificate {
    let mut params =
        CertificateParams::new(Vec::<String>::new()).expect("empty SAN list is valid");
    params.distinguished_name = distinguished_name;

    let key_pair = KeyPair::generate().expect("key generation should succeed");
    let cert = params
        .self_signed(&key_pair)
        .expect("self-signing should succeed");

    MintedCertificate {
        certificate_pem: cert.pem(),
        key_pair: KeyPairPem {
            private_key: key_pair.serialize_pem(),
            public_key: key_pair.public_key_pem(),
        },
    }
}

/// Device certificate whose subject mirrors the provisioning script:
/// `C=US, ST=NY, O=MyCompany, OU=IoT, CN=<common_name>`.
pub fn device_certificate(common_name: &str) -> MintedCertificate {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CountryName, "US");
    dn.push(DnType::StateOrProvinceName, "NY");
    dn.push(DnType::OrganizationName, "MyCompany");
    dn.push(DnType::OrganizationalUnitName, "IoT");
    dn.push(DnType::CommonName, common_name);
    mint(dn)
}

/// PEM body of a device certificate with the given common name.
pub fn certificate_pem(common_name: &str) -> String {
    device_certificate(common_name).certificate_pem
}

/// PEM body of a certificate whose subject has no common name.
pub fn certificate_pem_without_cn() -> String {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::OrganizationName, "MyCompany");
    dn.push(DnType::OrganizationalUnitName, "IoT");
    mint(dn).certificate_pem
}

/// Something shaped like PEM that is not a certificate.
pub fn garbage_pem() -> String {
    "-----BEGIN CERTIFICATE-----\nbm90IGEgY2VydGlmaWNhdGU=\n-----END CERTIFICATE-----\n"
        .to_string()
}
