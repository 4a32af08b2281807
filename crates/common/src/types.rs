use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a body inside a dynamics world.
///
/// Handles are assigned sequentially from zero in the order bodies are added,
/// so they double as positions in `WorldState::bodies`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BodyHandle(pub usize);

impl fmt::Display for BodyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "body#{}", self.0)
    }
}

/// A resolved link: the owning body plus the link's index within that body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkId {
    pub body: BodyHandle,
    pub link: usize,
}

impl LinkId {
    pub fn new(body: BodyHandle, link: usize) -> Self {
        Self { body, link }
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/link#{}", self.body, self.link)
    }
}

/// A link named the way a project file names it: body name plus link name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkRef {
    pub body: String,
    pub link: String,
}

impl LinkRef {
    pub fn new(body: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            link: link.into(),
        }
    }
}

impl fmt::Display for LinkRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.body, self.link)
    }
}

/// Rigid transform: position and orientation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: DVec3,
    pub rotation: DQuat,
}

impl Transform {
    pub fn from_position(position: DVec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.rotation.is_finite()
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: DVec3::ZERO,
            rotation: DQuat::IDENTITY,
        }
    }
}
