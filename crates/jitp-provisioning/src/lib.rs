//! # JITP Provisioning
//!
//! Workflows that turn a newly registered device certificate into a
//! provisioned device:
//!
//! - [`IdentityExtractor`] reads the device id from the certificate subject
//! - [`PolicyRotator`] replaces a named policy (detach, delete, create, attach)
//! - [`DeviceRecordProvisioner`] creates and tears down device records
//! - [`ActivationOrchestrator`] sequences the above for one trigger
//!
//! plus bootstrap issuance, telemetry archival, and the [`ProvisioningService`]
//! entry points that wrap them for the trigger system.
//!
//! Every workflow is generic over the effect traits in `jitp_core::effects`,
//! so the same code runs against the local handlers in `jitp-effects` and the
//! stateful mocks in `jitp-testkit`.

pub mod activation;
pub mod archival;
pub mod device_record;
pub mod dispatch;
pub mod handlers;
pub mod identity;
pub mod issuance;
pub mod policy_rotation;
pub mod telemetry;

pub use activation::{ActivationOrchestrator, ActivationReport, ActivationStage};
pub use archival::EventArchiver;
pub use device_record::DeviceRecordProvisioner;
pub use dispatch::{ConfiguredDispatch, InlineDispatch, InvocationDispatch, RecordDispatch};
pub use handlers::{EntryPoint, ProvisioningService};
pub use identity::IdentityExtractor;
pub use issuance::BootstrapIssuer;
pub use policy_rotation::{PolicyRotator, Retirement};
pub use telemetry::TelemetryArchiver;
