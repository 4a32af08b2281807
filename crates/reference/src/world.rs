use glam::DVec3;
use serde::{Deserialize, Serialize};
use stepsim_common::{BodyHandle, LinkId, Transform};
use stepsim_kernel::{
    BodyState, Collision, ControlOutput, DynamicsError, DynamicsWorld, Integrator, LinkState,
    WorldSettings, WorldState,
};

use crate::model::ModelSpec;

const ACTUATORS: usize = 3;

/// Tuning for the penalty contact model and divergence check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigidWorldConfig {
    /// Normal force per metre of penetration.
    pub contact_stiffness: f64,
    /// Normal force per m/s of approach speed, before restitution scaling.
    pub contact_damping: f64,
    /// A body moving faster than this (m/s) counts as diverged.
    pub max_speed: f64,
}

impl Default for RigidWorldConfig {
    fn default() -> Self {
        Self {
            contact_stiffness: 2.0e4,
            contact_damping: 40.0,
            max_speed: 1.0e3,
        }
    }
}

/// Body value consumed by [`RigidWorld::add_body`].
#[derive(Debug, Clone, PartialEq)]
pub struct RigidBody {
    pub model: ModelSpec,
    pub position: DVec3,
    pub velocity: DVec3,
}

impl RigidBody {
    pub fn new(model: ModelSpec, position: DVec3) -> Self {
        Self {
            model,
            position,
            velocity: DVec3::ZERO,
        }
    }
}

#[derive(Debug)]
struct Entry {
    name: String,
    body: RigidBody,
    /// Actuator input for the next advance.
    efforts: DVec3,
    /// Actuator input used by the last advance.
    applied: DVec3,
}

/// Translational rigid-body world with penalty contacts.
#[derive(Debug, Default)]
pub struct RigidWorld {
    config: RigidWorldConfig,
    settings: WorldSettings,
    entries: Vec<Entry>,
}

impl RigidWorld {
    pub fn new(config: RigidWorldConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn settings(&self) -> &WorldSettings {
        &self.settings
    }

    pub fn body_count(&self) -> usize {
        self.entries.len()
    }

    /// Radius of a link's sphere.
    pub fn link_radius(&self, link: LinkId) -> Option<f64> {
        self.entries
            .get(link.body.0)
            .and_then(|e| e.body.model.links.get(link.link))
            .map(|l| l.radius)
    }

    fn contact_forces(&self, contacts: &[Collision]) -> Vec<DVec3> {
        let mut forces = vec![DVec3::ZERO; self.entries.len()];
        for contact in contacts {
            let (a, b) = (contact.a.body.0, contact.b.body.0);
            if a == b {
                continue;
            }
            let (Some(ea), Some(eb)) = (self.entries.get(a), self.entries.get(b)) else {
                continue;
            };
            let damping = self.config.contact_damping * (1.0 - contact.params.restitution).max(0.0);
            let relative = eb.body.velocity - ea.body.velocity;

            for point in &contact.points {
                let approach = relative.dot(point.normal);
                let normal_force =
                    (self.config.contact_stiffness * point.depth - damping * approach).max(0.0);
                let mut force = point.normal * normal_force;

                let tangential = relative - point.normal * approach;
                let slip = tangential.length();
                if slip > 1.0e-6 {
                    let friction = (contact.params.sliding_friction * normal_force)
                        .min(self.config.contact_damping * slip);
                    force -= tangential / slip * friction;
                }

                forces[b] += force;
                forces[a] -= force;
            }
        }
        forces
    }
}

impl DynamicsWorld for RigidWorld {
    type Body = RigidBody;

    fn reset(&mut self, settings: &WorldSettings) -> Result<(), DynamicsError> {
        if !settings.gravity.is_finite() {
            return Err(DynamicsError::InvalidBody("gravity must be finite".into()));
        }
        self.settings = settings.clone();
        self.entries.clear();
        Ok(())
    }

    fn add_body(&mut self, name: &str, body: RigidBody) -> Result<BodyHandle, DynamicsError> {
        body.model
            .check()
            .map_err(|reason| DynamicsError::InvalidBody(format!("{name}: {reason}")))?;
        self.entries.push(Entry {
            name: name.to_string(),
            body,
            efforts: DVec3::ZERO,
            applied: DVec3::ZERO,
        });
        Ok(BodyHandle(self.entries.len() - 1))
    }

    fn link_index(&self, body: BodyHandle, link: &str) -> Option<usize> {
        self.entries.get(body.0)?.body.model.link_index(link)
    }

    fn apply_control(&mut self, body: BodyHandle, output: &ControlOutput) -> Result<(), DynamicsError> {
        let entry = self
            .entries
            .get_mut(body.0)
            .ok_or(DynamicsError::UnknownBody(body))?;
        for cmd in &output.commands {
            if cmd.actuator >= ACTUATORS {
                return Err(DynamicsError::InvalidActuator {
                    body,
                    actuator: cmd.actuator,
                });
            }
            entry.efforts[cmd.actuator] = cmd.value;
        }
        Ok(())
    }

    /// Bodies may be left part-way integrated when this fails; the caller
    /// restores a captured state.
    fn advance(&mut self, dt: f64, contacts: &[Collision]) -> Result<(), DynamicsError> {
        let contact_forces = self.contact_forces(contacts);
        let gravity = self.settings.gravity;
        let integrator = self.settings.integrator;
        let max_speed = self.config.max_speed;

        for (entry, contact) in self.entries.iter_mut().zip(contact_forces) {
            entry.applied = std::mem::take(&mut entry.efforts);
            if entry.body.model.fixed {
                continue;
            }
            let body = &mut entry.body;
            let accel = gravity + (entry.applied + contact) / body.model.mass;
            match integrator {
                Integrator::Euler => {
                    body.position += body.velocity * dt;
                    body.velocity += accel * dt;
                }
                Integrator::SemiImplicitEuler => {
                    body.velocity += accel * dt;
                    body.position += body.velocity * dt;
                }
            }

            let speed = body.velocity.length();
            if !speed.is_finite() || !body.position.is_finite() {
                return Err(DynamicsError::NonFinite {
                    body: entry.name.clone(),
                });
            }
            if speed > max_speed {
                return Err(DynamicsError::Diverged(format!(
                    "{} reached {speed:.1} m/s",
                    entry.name
                )));
            }
        }
        Ok(())
    }

    fn capture_state(&self) -> WorldState {
        let bodies = self
            .entries
            .iter()
            .map(|entry| BodyState {
                name: entry.name.clone(),
                links: entry
                    .body
                    .model
                    .links
                    .iter()
                    .map(|link| LinkState {
                        name: link.name.clone(),
                        transform: Transform::from_position(entry.body.position + link.offset),
                        linear_velocity: entry.body.velocity,
                        angular_velocity: DVec3::ZERO,
                    })
                    .collect(),
                joint_positions: Vec::new(),
                joint_velocities: Vec::new(),
                actuator_efforts: entry.applied.to_array().to_vec(),
            })
            .collect();
        WorldState {
            time: 0.0,
            step: 0,
            bodies,
        }
    }

    fn restore_state(&mut self, state: &WorldState) -> Result<(), DynamicsError> {
        if state.bodies.len() != self.entries.len() {
            return Err(DynamicsError::Restore(format!(
                "state has {} bodies, world has {}",
                state.bodies.len(),
                self.entries.len()
            )));
        }
        for (entry, saved) in self.entries.iter_mut().zip(&state.bodies) {
            let (Some(root), Some(spec)) = (saved.links.first(), entry.body.model.links.first())
            else {
                return Err(DynamicsError::Restore(format!("no links saved for {}", entry.name)));
            };
            if saved.name != entry.name {
                return Err(DynamicsError::Restore(format!(
                    "expected body {}, found {}",
                    entry.name, saved.name
                )));
            }
            entry.body.position = root.transform.position - spec.offset;
            entry.body.velocity = root.linear_velocity;
            entry.efforts = DVec3::ZERO;
            if let &[x, y, z] = saved.actuator_efforts.as_slice() {
                entry.applied = DVec3::new(x, y, z);
            }
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}
