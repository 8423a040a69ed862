//! # Stateful Effect Handlers for Testing
//!
//! Handlers here keep shared mutable state (`Arc<RwLock<_>>`) so tests can
//! seed collaborators, inject faults, and inspect what a workflow did. They
//! stay out of `jitp-effects`, whose handlers hold no state beyond their
//! configuration.

pub mod archive;
pub mod control_plane;
pub mod invocation;
pub mod time;

pub use archive::MemoryArchive;
pub use control_plane::{Call, MemoryControlPlane, Operation};
pub use invocation::{Invocation, RecordingInvoker};
pub use time::FixedClock;
