//! Command-line driver for just-in-time device provisioning.
//!
//! Runs the trigger entry points against the local control plane and the
//! filesystem archive, so a full onboarding can be exercised on one machine.

pub mod commands;
pub mod handlers;
pub mod logging;
pub mod runtime;

pub use commands::Commands;
pub use runtime::{LoopbackInvoker, Runtime};
