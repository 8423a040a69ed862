//! Convenience supertraits combining other effects (no handlers needed).

use super::{CredentialEffects, PolicyEffects, ThingRegistryEffects};

/// Everything the activation workflow needs from the control plane.
pub trait ControlPlaneEffects: CredentialEffects + PolicyEffects + ThingRegistryEffects {}

impl<T> ControlPlaneEffects for T where T: CredentialEffects + PolicyEffects + ThingRegistryEffects {}
