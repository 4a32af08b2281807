//! Capability traits for the two numerical collaborators: the dynamics world
//! and the narrow-phase collision engine.
//!
//! The kernel never looks inside either engine. It only sequences calls to
//! them and decides what gets committed.

use glam::DVec3;
use serde::{Deserialize, Serialize};
use stepsim_common::{BodyHandle, LinkId};

use crate::control::ControlOutput;
use crate::pairs::LinkPair;
use crate::project::{ContactParams, WorldSettings};
use crate::state::WorldState;

/// Errors reported by a [`DynamicsWorld`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DynamicsError {
    #[error("solver diverged: {0}")]
    Diverged(String),
    #[error("state of body '{body}' is not finite")]
    NonFinite { body: String },
    #[error("unknown body {0}")]
    UnknownBody(BodyHandle),
    #[error("invalid command for {body}: actuator {actuator} out of range")]
    InvalidActuator { body: BodyHandle, actuator: usize },
    #[error("body rejected: {0}")]
    InvalidBody(String),
    #[error("cannot restore state: {0}")]
    Restore(String),
}

/// Errors reported by a [`CollisionEngine`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CollisionError {
    #[error("malformed geometry on {link}: {reason}")]
    MalformedGeometry { link: LinkId, reason: String },
    #[error("link {0} is missing from the world state")]
    MissingLink(LinkId),
    #[error("collision engine failure: {0}")]
    Engine(String),
}

/// One contact point between the two links of a pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContactPoint {
    pub position: DVec3,
    /// Unit normal pointing from the pair's first link towards the second.
    pub normal: DVec3,
    /// Interpenetration depth, positive when overlapping.
    pub depth: f64,
}

/// Contacts found on one registered link-pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collision {
    /// Registration index of the pair.
    pub pair: usize,
    pub a: LinkId,
    pub b: LinkId,
    pub params: ContactParams,
    pub points: Vec<ContactPoint>,
}

/// The rigid/multibody engine that owns body state and integrates it.
///
/// Bodies get sequential handles starting at zero, and [`capture_state`]
/// lists them in handle order.
///
/// [`capture_state`]: DynamicsWorld::capture_state
pub trait DynamicsWorld {
    /// Engine-specific body description produced by a body factory.
    type Body;

    /// Drop every body and reconfigure for a new session.
    fn reset(&mut self, settings: &WorldSettings) -> Result<(), DynamicsError>;

    fn add_body(&mut self, name: &str, body: Self::Body) -> Result<BodyHandle, DynamicsError>;

    /// Index of the named link within `body`, if both exist.
    fn link_index(&self, body: BodyHandle, link: &str) -> Option<usize>;

    /// Set actuator inputs for the next advance. Inputs last one advance.
    fn apply_control(
        &mut self,
        body: BodyHandle,
        output: &ControlOutput,
    ) -> Result<(), DynamicsError>;

    /// Integrate all bodies by `dt` using the given contact set.
    fn advance(&mut self, dt: f64, contacts: &[Collision]) -> Result<(), DynamicsError>;

    /// Snapshot the current state. Time and step fields are stamped by the caller.
    fn capture_state(&self) -> WorldState;

    /// Put every body back to a previously captured state.
    fn restore_state(&mut self, state: &WorldState) -> Result<(), DynamicsError>;

    /// Release all bodies.
    fn clear(&mut self);
}

/// Narrow-phase collision detection over registered link-pairs.
pub trait CollisionEngine<W: DynamicsWorld> {
    /// Precomputed per-pair data, built once at registration.
    type Geometry;

    fn prepare(&mut self, world: &W, a: LinkId, b: LinkId) -> Result<Self::Geometry, CollisionError>;

    /// Contact points for `pair` in `state`. Empty when the links are apart.
    fn detect(
        &self,
        state: &WorldState,
        pair: &LinkPair<Self::Geometry>,
    ) -> Result<Vec<ContactPoint>, CollisionError>;
}
