//! Data model shared by every provisioning crate.

pub mod certificate;
pub mod identifiers;
pub mod policy;
pub mod trigger;

pub use certificate::{
    CertificateDescription, CertificateStatus, IssuedCredential, KeyPairPem, ThingDescription,
};
pub use identifiers::{AccountContext, CertificateId, DeviceId, PolicyName, Principal};
pub use policy::{BootstrapScope, Effect, PolicyDocument, PolicyStatement};
pub use trigger::{
    ActivationRequest, CertificateRegistered, CreateThingRequest, DeleteThingRequest,
    DeviceDataMessage, HandlerStatus, Outcome, ThingCreationRequest,
};
