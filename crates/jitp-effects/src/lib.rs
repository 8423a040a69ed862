//! # JITP Effects
//!
//! Production handlers for the effect traits defined in `jitp-core`:
//!
//! - [`FilesystemArchiveHandler`] - archive sink on the local filesystem
//! - [`SystemTimeHandler`] - wall clock
//! - [`LocalControlPlane`] - credential service, policy store and device
//!   registry backed by a JSON state file
//! - [`BoundedControlPlane`] - timeout and transient-retry wrapper for any
//!   of the above
//! - [`CertificateAuthority`] - signs device certificates for registration
//!
//! Handlers here are constructed once at process start and shared behind
//! `Arc`. Stateful test doubles live in `jitp-testkit`.

pub mod archive;
pub mod authority;
pub mod control_plane;
pub mod reliability;
pub mod time;

pub use archive::FilesystemArchiveHandler;
pub use authority::{AuthorityError, CertificateAuthority, DeviceCertificate};
pub use control_plane::{certificate_fingerprint, issued_common_name, LocalControlPlane};
pub use reliability::{BoundedControlPlane, CallBudget};
pub use time::SystemTimeHandler;
