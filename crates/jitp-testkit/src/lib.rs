//! # JITP Testkit
//!
//! Stateful in-memory collaborators and certificate fixtures for testing
//! provisioning workflows without a control plane.
//!
//! ```rust,ignore
//! use jitp_testkit::{fixtures, MemoryArchive, MemoryControlPlane};
//!
//! #[tokio::test]
//! async fn activation() {
//!     let control_plane = MemoryControlPlane::default();
//!     control_plane
//!         .insert_certificate(&cert, CertificateStatus::PendingActivation, Some(fixtures::certificate_pem("dev-42")))
//!         .await;
//!     // run a workflow, then inspect control_plane.journal()
//! }
//! ```

pub mod fixtures;
pub mod stateful_effects;

pub use stateful_effects::{
    Call, FixedClock, Invocation, MemoryArchive, MemoryControlPlane, Operation, RecordingInvoker,
};
