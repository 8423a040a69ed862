//! Effect traits for every external collaborator.
//!
//! These traits define **what** a workflow may ask of the outside world;
//! handlers in `jitp-effects` (production) and `jitp-testkit` (stateful mocks)
//! define **how**. Workflows never hold an ambient client: a handler is built
//! once at process start and passed in.
//!
//! Every method reports failure as a [`ServiceError`](crate::ServiceError) whose
//! kind distinguishes "not found" and "already exists" from real failures.

pub mod archive;
pub mod credential;
pub mod invocation;
pub mod policy;
pub mod registry;
pub mod supertraits;
pub mod time;

pub use archive::ArchiveEffects;
pub use credential::CredentialEffects;
pub use invocation::InvocationEffects;
pub use policy::PolicyEffects;
pub use registry::ThingRegistryEffects;
pub use supertraits::ControlPlaneEffects;
pub use time::PhysicalTimeEffects;
