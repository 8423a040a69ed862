//! Certificate fixtures carry the subjects tests expect.

#![allow(clippy::unwrap_used, missing_docs)]

use jitp_testkit::fixtures;
use x509_parser::pem::parse_x509_pem;

fn common_names(pem: &str) -> Vec<String> {
    let (_, pem) = parse_x509_pem(pem.as_bytes()).unwrap();
    let cert = pem.parse_x509().unwrap();
    cert.subject()
        .iter_common_name()
        .map(|cn| cn.as_str().unwrap().to_string())
        .collect()
}

#[test]
fn device_certificate_carries_common_name() {
    assert_eq!(common_names(&fixtures::certificate_pem("dev-42")), vec!["dev-42"]);
}

#[test]
fn certificate_without_cn_has_none() {
    assert!(common_names(&fixtures::certificate_pem_without_cn()).is_empty());
}

#[test]
fn minted_keys_are_pem() {
    let minted = fixtures::device_certificate("dev-1");
    assert!(minted.key_pair.private_key.contains("PRIVATE KEY"));
    assert!(minted.key_pair.public_key.contains("PUBLIC KEY"));
}
