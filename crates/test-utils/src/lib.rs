//! Test doubles for the kernel's collaborator traits, shared by the
//! workspace's test suites.
//!
//! - [`MockWorld`]: unit-mass point bodies, three force actuators per body,
//!   optional one-shot divergence on a chosen advance call.
//! - [`ScriptedCollision`]: reports contact for link-name pairs declared up front.
//! - [`MockFactory`]: builds [`MockBody`] values and `constant`, `timeout` and
//!   `fail` receivers.
//! - [`AlwaysTimeout`], [`FailingReceiver`]: misbehaving controllers.
//! - [`RecordingSink`], [`FailingSink`]: scene observers.

use glam::DVec3;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};
use stepsim_common::{BodyHandle, LinkId, Transform};

use stepsim_kernel::{
    BodyFactory, BodySpec, BodyState, BuiltBody, ClockReceiver, Collision, CollisionEngine,
    CollisionError, ContactPoint, ControlOutput, DynamicsError, DynamicsWorld, FactoryError,
    LinkPair, LinkState, LocalReceiver, ReceiverError, SceneError, SceneSink, TickContext,
    WorldSettings, WorldState,
};

const ACTUATORS: usize = 3;

/// Body description understood by [`MockWorld`].
#[derive(Debug, Clone, PartialEq)]
pub struct MockBody {
    pub links: Vec<String>,
    pub position: DVec3,
    pub velocity: DVec3,
}

impl MockBody {
    pub fn new(links: &[&str]) -> Self {
        Self {
            links: links.iter().map(|l| l.to_string()).collect(),
            position: DVec3::ZERO,
            velocity: DVec3::ZERO,
        }
    }
}

#[derive(Debug)]
struct MockEntry {
    name: String,
    body: MockBody,
    efforts: [f64; ACTUATORS],
    last_efforts: [f64; ACTUATORS],
}

/// Point-mass world: each actuator is a unit force along x, y or z.
#[derive(Debug, Default)]
pub struct MockWorld {
    entries: Vec<MockEntry>,
    settings: Option<WorldSettings>,
    advance_calls: u64,
    diverge_on: Option<u64>,
    applied: Vec<(BodyHandle, ControlOutput)>,
    contacts_seen: Vec<usize>,
}

impl MockWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `call`-th advance (1-based, counted over the world's lifetime).
    /// The failing advance scribbles over body state first, so callers can
    /// check that a rollback happened.
    pub fn diverging_on(call: u64) -> Self {
        Self {
            diverge_on: Some(call),
            ..Self::default()
        }
    }

    pub fn advance_calls(&self) -> u64 {
        self.advance_calls
    }

    pub fn body_count(&self) -> usize {
        self.entries.len()
    }

    pub fn settings(&self) -> Option<&WorldSettings> {
        self.settings.as_ref()
    }

    /// Every control output applied, in order.
    pub fn applied(&self) -> &[(BodyHandle, ControlOutput)] {
        &self.applied
    }

    /// Contact count handed to each advance call.
    pub fn contacts_seen(&self) -> &[usize] {
        &self.contacts_seen
    }
}

impl DynamicsWorld for MockWorld {
    type Body = MockBody;

    fn reset(&mut self, settings: &WorldSettings) -> Result<(), DynamicsError> {
        self.entries.clear();
        self.applied.clear();
        self.contacts_seen.clear();
        self.settings = Some(settings.clone());
        Ok(())
    }

    fn add_body(&mut self, name: &str, body: MockBody) -> Result<BodyHandle, DynamicsError> {
        if body.links.is_empty() {
            return Err(DynamicsError::InvalidBody(format!("{name} has no links")));
        }
        self.entries.push(MockEntry {
            name: name.to_string(),
            body,
            efforts: [0.0; ACTUATORS],
            last_efforts: [0.0; ACTUATORS],
        });
        Ok(BodyHandle(self.entries.len() - 1))
    }

    fn link_index(&self, body: BodyHandle, link: &str) -> Option<usize> {
        self.entries
            .get(body.0)
            .and_then(|e| e.body.links.iter().position(|l| l == link))
    }

    fn apply_control(&mut self, body: BodyHandle, output: &ControlOutput) -> Result<(), DynamicsError> {
        let entry = self
            .entries
            .get_mut(body.0)
            .ok_or(DynamicsError::UnknownBody(body))?;
        for cmd in &output.commands {
            let slot = entry
                .efforts
                .get_mut(cmd.actuator)
                .ok_or(DynamicsError::InvalidActuator {
                    body,
                    actuator: cmd.actuator,
                })?;
            *slot = cmd.value;
        }
        self.applied.push((body, output.clone()));
        Ok(())
    }

    fn advance(&mut self, dt: f64, contacts: &[Collision]) -> Result<(), DynamicsError> {
        self.advance_calls += 1;
        if self.diverge_on == Some(self.advance_calls) {
            for entry in &mut self.entries {
                entry.body.position += DVec3::splat(1.0e6);
            }
            return Err(DynamicsError::Diverged(format!(
                "scripted divergence on advance {}",
                self.advance_calls
            )));
        }
        for entry in &mut self.entries {
            let force = DVec3::from_array(entry.efforts);
            entry.body.velocity += force * dt;
            entry.body.position += entry.body.velocity * dt;
            entry.last_efforts = entry.efforts;
            entry.efforts = [0.0; ACTUATORS];
        }
        self.contacts_seen.push(contacts.len());
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
                    .links
                    .iter()
                    .enumerate()
                    .map(|(i, link)| LinkState {
                        name: link.clone(),
                        transform: Transform::from_position(
                            entry.body.position + DVec3::new(i as f64, 0.0, 0.0),
                        ),
                        linear_velocity: entry.body.velocity,
                        angular_velocity: DVec3::ZERO,
                    })
                    .collect(),
                joint_positions: Vec::new(),
                joint_velocities: Vec::new(),
                actuator_efforts: entry.last_efforts.to_vec(),
            })
            .collect();
        WorldState {
            time: 0.0,
            step: 0,
            bodies,
        }
    }

    fn restore_state(&mut self, state: &WorldState) -> Result<(), DynamicsError> {
        for (i, entry) in self.entries.iter_mut().enumerate() {
            let root = state
                .bodies
                .get(i)
                .and_then(|b| b.links.first())
                .ok_or_else(|| DynamicsError::Restore(format!("no state for {}", entry.name)))?;
            entry.body.position = root.transform.position;
            entry.body.velocity = root.linear_velocity;
            entry.efforts = [0.0; ACTUATORS];
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Collision engine that reports contact only for declared link-name pairs.
#[derive(Debug, Default)]
pub struct ScriptedCollision {
    touching: BTreeSet<(String, String)>,
    malformed: BTreeSet<String>,
}

fn name_key(a: &str, b: &str) -> (String, String) {
    if b < a {
        (b.to_string(), a.to_string())
    } else {
        (a.to_string(), b.to_string())
    }
}

impl ScriptedCollision {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn touching(mut self, a: &str, b: &str) -> Self {
        self.touching.insert(name_key(a, b));
        self
    }

    /// Any pair involving `link` fails detection.
    pub fn malformed(mut self, link: &str) -> Self {
        self.malformed.insert(link.to_string());
        self
    }
}

impl<W: DynamicsWorld> CollisionEngine<W> for ScriptedCollision {
    type Geometry = ();

    fn prepare(&mut self, _world: &W, _a: LinkId, _b: LinkId) -> Result<(), CollisionError> {
        Ok(())
    }

    fn detect(&self, state: &WorldState, pair: &LinkPair<()>) -> Result<Vec<ContactPoint>, CollisionError> {
        let a = state.link(pair.a).ok_or(CollisionError::MissingLink(pair.a))?;
        let b = state.link(pair.b).ok_or(CollisionError::MissingLink(pair.b))?;
        for (id, link) in [(pair.a, a), (pair.b, b)] {
            if self.malformed.contains(&link.name) {
                return Err(CollisionError::MalformedGeometry {
                    link: id,
                    reason: "scripted".into(),
                });
            }
        }
        if !self.touching.contains(&name_key(&a.name, &b.name)) {
            return Ok(Vec::new());
        }
        let pa = a.transform.position;
        let pb = b.transform.position;
        Ok(vec![ContactPoint {
            position: (pa + pb) * 0.5,
            normal: (pb - pa).normalize_or_zero(),
            depth: 0.01,
        }])
    }
}

/// Builds [`MockBody`] values from a model table.
///
/// Controller kinds: `constant` (params `actuator`, `value`), `timeout`, `fail`.
#[derive(Debug, Clone)]
pub struct MockFactory {
    models: BTreeMap<String, Vec<String>>,
}

impl MockFactory {
    /// Factory knowing `box` (one link, `root`) and `arm` (`root`, `hand`).
    pub fn new() -> Self {
        Self {
            models: BTreeMap::new(),
        }
        .with_model("box", &["root"])
        .with_model("arm", &["root", "hand"])
    }

    pub fn with_model(mut self, name: &str, links: &[&str]) -> Self {
        self.models
            .insert(name.to_string(), links.iter().map(|l| l.to_string()).collect());
        self
    }
}

impl Default for MockFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl BodyFactory<MockBody> for MockFactory {
    fn build(&mut self, spec: &BodySpec) -> Result<BuiltBody<MockBody>, FactoryError> {
        let links = self
            .models
            .get(&spec.model)
            .ok_or_else(|| FactoryError::UnknownModel(spec.model.clone()))?;
        let body = MockBody {
            links: links.clone(),
            position: spec.position,
            velocity: spec.velocity,
        };

        let mut receivers: Vec<Box<dyn ClockReceiver>> = Vec::new();
        for c in &spec.controllers {
            let receiver: Box<dyn ClockReceiver> = match c.kind.as_str() {
                "constant" => {
                    let actuator = c.param("actuator", 0.0) as usize;
                    let value = c.param("value", 1.0);
                    Box::new(LocalReceiver::new(c.name.clone(), move |_: &TickContext| {
                        ControlOutput::new().with(actuator, value)
                    }))
                }
                "timeout" => Box::new(AlwaysTimeout::new(c.name.clone())),
                "fail" => Box::new(FailingReceiver::new(c.name.clone())),
                other => {
                    return Err(FactoryError::UnknownController {
                        name: c.name.clone(),
                        kind: other.to_string(),
                    });
                }
            };
            receivers.push(receiver);
        }
        Ok(BuiltBody { body, receivers })
    }
}

/// Receiver that never answers in time.
pub struct AlwaysTimeout {
    name: String,
}

impl AlwaysTimeout {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl ClockReceiver for AlwaysTimeout {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self, ctx: &TickContext) -> Result<ControlOutput, ReceiverError> {
        Err(ReceiverError::Timeout(ctx.timeout))
    }
}

/// Receiver whose controller reports an error on every tick.
pub struct FailingReceiver {
    name: String,
}

impl FailingReceiver {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl ClockReceiver for FailingReceiver {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self, _ctx: &TickContext) -> Result<ControlOutput, ReceiverError> {
        Err(ReceiverError::Failed("scripted failure".into()))
    }
}

/// Shared view of the states a [`RecordingSink`] received.
#[derive(Debug, Clone, Default)]
pub struct SeenStates(Arc<Mutex<Vec<WorldState>>>);

impl SeenStates {
    pub fn states(&self) -> Vec<WorldState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn times(&self) -> Vec<f64> {
        self.states().iter().map(|s| s.time).collect()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Scene sink that keeps a copy of every published state.
pub struct RecordingSink {
    seen: SeenStates,
}

impl RecordingSink {
    pub fn observed() -> (Self, SeenStates) {
        let seen = SeenStates::default();
        (Self { seen: seen.clone() }, seen)
    }
}

impl SceneSink for RecordingSink {
    fn publish(&mut self, state: &WorldState) -> Result<(), SceneError> {
        self.seen
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(state.clone());
        Ok(())
    }
}

/// Scene sink that always fails.
pub struct FailingSink;

impl SceneSink for FailingSink {
    fn publish(&mut self, _state: &WorldState) -> Result<(), SceneError> {
        Err(SceneError::Failed("scripted sink failure".into()))
    }
}
