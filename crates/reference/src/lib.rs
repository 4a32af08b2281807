//! Reference engines for the stepping kernel.
//!
//! Bodies are rigid clusters of sphere links that translate without rotating.
//! Each body exposes three actuators, forces along x, y and z. Contacts are
//! resolved with penalty springs. Accurate enough for demos and end-to-end
//! tests of the kernel, nothing more.

mod collision;
mod factory;
mod model;
mod world;

pub use collision::{SphereCollision, SpherePair};
pub use factory::{CONTROLLER_KINDS, HoldController, ReferenceFactory};
pub use model::{LinkSpec, ModelError, ModelLibrary, ModelSpec};
pub use world::{RigidBody, RigidWorld, RigidWorldConfig};

/// The kernel simulator specialised to the reference engines.
pub type ReferenceSimulator = stepsim_kernel::Simulator<RigidWorld, SphereCollision>;
