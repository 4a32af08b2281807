use glam::DVec3;
use serde::{Deserialize, Serialize};
use stepsim_common::{BodyHandle, LinkId, Transform};

/// Kinematic state of one link after a dynamics advance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkState {
    pub name: String,
    pub transform: Transform,
    pub linear_velocity: DVec3,
    pub angular_velocity: DVec3,
}

impl LinkState {
    pub fn at_rest(name: impl Into<String>, transform: Transform) -> Self {
        Self {
            name: name.into(),
            transform,
            linear_velocity: DVec3::ZERO,
            angular_velocity: DVec3::ZERO,
        }
    }

    fn is_finite(&self) -> bool {
        self.transform.is_finite()
            && self.linear_velocity.is_finite()
            && self.angular_velocity.is_finite()
    }
}

/// State of one body: its links plus joint-space quantities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BodyState {
    pub name: String,
    pub links: Vec<LinkState>,
    pub joint_positions: Vec<f64>,
    pub joint_velocities: Vec<f64>,
    /// Effort actually applied on each actuator during the last advance.
    pub actuator_efforts: Vec<f64>,
}

impl BodyState {
    pub fn link(&self, name: &str) -> Option<&LinkState> {
        self.links.iter().find(|l| l.name == name)
    }

    pub fn is_finite(&self) -> bool {
        self.links.iter().all(LinkState::is_finite)
            && self.joint_positions.iter().all(|v| v.is_finite())
            && self.joint_velocities.iter().all(|v| v.is_finite())
            && self.actuator_efforts.iter().all(|v| v.is_finite())
    }
}

/// Snapshot of every body after the most recently completed step.
///
/// Published behind an `Arc` and never mutated afterwards; the next step
/// replaces it wholesale. `bodies` is indexed by [`BodyHandle`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    /// Simulation time in seconds.
    pub time: f64,
    /// Number of completed steps that produced this state.
    pub step: u64,
    pub bodies: Vec<BodyState>,
}

impl WorldState {
    pub fn body(&self, handle: BodyHandle) -> Option<&BodyState> {
        self.bodies.get(handle.0)
    }

    pub fn body_by_name(&self, name: &str) -> Option<&BodyState> {
        self.bodies.iter().find(|b| b.name == name)
    }

    pub fn link(&self, id: LinkId) -> Option<&LinkState> {
        self.body(id.body).and_then(|b| b.links.get(id.link))
    }

    /// Name of the first body holding a NaN or infinite value, if any.
    pub fn first_non_finite_body(&self) -> Option<&str> {
        self.bodies
            .iter()
            .find(|b| !b.is_finite())
            .map(|b| b.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WorldState {
        WorldState {
            time: 0.0,
            step: 0,
            bodies: vec![
                BodyState {
                    name: "base".into(),
                    links: vec![LinkState::at_rest("root", Transform::default())],
                    ..BodyState::default()
                },
                BodyState {
                    name: "arm".into(),
                    links: vec![
                        LinkState::at_rest("root", Transform::default()),
                        LinkState::at_rest("hand", Transform::from_position(DVec3::Z)),
                    ],
                    joint_positions: vec![0.1],
                    ..BodyState::default()
                },
            ],
        }
    }

    #[test]
    fn link_lookup_by_id() {
        let state = sample();
        let hand = state.link(LinkId::new(BodyHandle(1), 1)).unwrap();
        assert_eq!(hand.name, "hand");
        assert!(state.link(LinkId::new(BodyHandle(2), 0)).is_none());
    }

    #[test]
    fn body_lookup_by_name() {
        let state = sample();
        assert_eq!(state.body_by_name("arm").unwrap().links.len(), 2);
        assert!(state.body_by_name("leg").is_none());
    }

    #[test]
    fn finite_state_passes_check() {
        assert!(sample().first_non_finite_body().is_none());
    }

    #[test]
    fn nan_joint_is_reported() {
        let mut state = sample();
        state.bodies[1].joint_velocities.push(f64::NAN);
        assert_eq!(state.first_non_finite_body(), Some("arm"));
    }
}
