//! # JITP Core
//!
//! Foundation crate for just-in-time device provisioning: identifiers and
//! data model, trigger payloads, policy documents, the error taxonomy, the
//! effect traits every external collaborator is reached through, and process
//! configuration.
//!
//! Nothing here talks to a network or a disk. Production handlers live in
//! `jitp-effects`, stateful test handlers in `jitp-testkit`, and the
//! workflows themselves in `jitp-provisioning`.

pub mod config;
pub mod effects;
pub mod errors;
pub mod types;

pub use config::{JitpConfig, ProvisioningMode};
pub use errors::{ErrorKind, JitpError, JitpResult, ServiceError, ServiceErrorKind};
pub use types::{
    AccountContext, CertificateDescription, CertificateId, CertificateStatus, DeviceId,
    HandlerStatus, PolicyDocument, PolicyName, Principal,
};
