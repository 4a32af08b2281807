//! In-memory project description consumed by [`Simulator::init`](crate::Simulator::init).
//!
//! Loading from disk is the caller's business; every type here derives serde
//! so YAML or JSON front ends can deserialize it directly.

use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use stepsim_common::LinkRef;

use crate::error::InitError;

/// A complete simulation project: bodies, collision pairs and timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    /// Fixed step size in seconds.
    pub time_step: f64,
    /// Simulation stops once this much time has elapsed. `None` runs forever.
    #[serde(default)]
    pub total_time: Option<f64>,
    #[serde(default)]
    pub world: WorldSettings,
    #[serde(default)]
    pub bodies: Vec<BodySpec>,
    #[serde(default)]
    pub collision_pairs: Vec<CollisionPairSpec>,
}

impl Project {
    pub fn new(name: impl Into<String>, time_step: f64) -> Self {
        Self {
            name: name.into(),
            time_step,
            total_time: None,
            world: WorldSettings::default(),
            bodies: Vec::new(),
            collision_pairs: Vec::new(),
        }
    }

    pub fn with_total_time(mut self, total_time: f64) -> Self {
        self.total_time = Some(total_time);
        self
    }

    pub fn with_body(mut self, body: BodySpec) -> Self {
        self.bodies.push(body);
        self
    }

    pub fn with_pair(mut self, a: LinkRef, b: LinkRef) -> Self {
        self.collision_pairs.push(CollisionPairSpec {
            a,
            b,
            contact: ContactParams::default(),
        });
        self
    }

    /// Check the scalar settings. Body and pair references are resolved later,
    /// against the dynamics world.
    pub fn validate(&self) -> Result<(), InitError> {
        if !self.time_step.is_finite() || self.time_step <= 0.0 {
            return Err(InitError::InvalidTimeStep(self.time_step));
        }
        if let Some(total) = self.total_time {
            if !total.is_finite() || total < 0.0 {
                return Err(InitError::InvalidTotalTime(total));
            }
        }
        Ok(())
    }

    /// Number of steps needed to reach `total_time`, if bounded.
    pub fn step_limit(&self) -> Option<u64> {
        // Tolerance absorbs representation error, e.g. 0.7 / 0.1 = 6.999...
        self.total_time
            .map(|total| (total / self.time_step - 1e-9).ceil().max(0.0) as u64)
    }
}

/// Global settings handed to the dynamics world on reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldSettings {
    pub gravity: DVec3,
    pub integrator: Integrator,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            gravity: DVec3::new(0.0, 0.0, -9.8),
            integrator: Integrator::default(),
        }
    }
}

/// Integration scheme requested from the dynamics world.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Integrator {
    Euler,
    #[default]
    SemiImplicitEuler,
}

/// One robot (or passive object) in the project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodySpec {
    pub name: String,
    /// Model reference resolved by the body factory.
    pub model: String,
    #[serde(default)]
    pub position: DVec3,
    #[serde(default)]
    pub velocity: DVec3,
    #[serde(default)]
    pub controllers: Vec<ControllerSpec>,
}

impl BodySpec {
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            position: DVec3::ZERO,
            velocity: DVec3::ZERO,
            controllers: Vec::new(),
        }
    }

    pub fn at(mut self, position: DVec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_controller(mut self, controller: ControllerSpec) -> Self {
        self.controllers.push(controller);
        self
    }
}

/// A controller attached to a body. `kind` is interpreted by the factory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerSpec {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
}

impl ControllerSpec {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: f64) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn param(&self, key: &str, default: f64) -> f64 {
        self.params.get(key).copied().unwrap_or(default)
    }
}

/// Two links checked against each other every step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollisionPairSpec {
    pub a: LinkRef,
    pub b: LinkRef,
    #[serde(default, flatten)]
    pub contact: ContactParams,
}

impl CollisionPairSpec {
    pub fn label(&self) -> String {
        format!("{}<->{}", self.a, self.b)
    }
}

/// Per-pair contact material handed to the dynamics world with each contact.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactParams {
    pub static_friction: f64,
    pub sliding_friction: f64,
    pub restitution: f64,
    /// Contacts shallower than this are ignored by the collision engine.
    pub culling_threshold: f64,
}

impl Default for ContactParams {
    fn default() -> Self {
        Self {
            static_friction: 0.5,
            sliding_friction: 0.5,
            restitution: 0.0,
            culling_threshold: 0.005,
        }
    }
}
