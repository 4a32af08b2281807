use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use stepsim_common::{BodyHandle, LinkId, LinkRef};

use crate::config::SimulatorConfig;
use crate::control::{ControlledBody, ReceiverError, TickContext};
use crate::engine::{Collision, CollisionEngine, CollisionError, DynamicsError, DynamicsWorld};
use crate::error::{InitError, StepError};
use crate::factory::BodyFactory;
use crate::pairs::{LinkPair, PairRegistry};
use crate::project::Project;
use crate::scene::SceneSink;
use crate::state::WorldState;
use crate::timing::PhaseTimings;

/// Counters describing how the session's steps went. Reset by `init`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepDiagnostics {
    pub steps_completed: u64,
    pub steps_failed: u64,
    /// Committed steps in which at least one receiver timed out or failed.
    pub steps_degraded: u64,
    pub receiver_timeouts: u64,
    pub receiver_failures: u64,
    pub scene_failures: u64,
    pub rollback_failures: u64,
}

/// Summary of one committed step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    /// Number of completed steps, including this one.
    pub step: u64,
    pub time: f64,
    pub degraded: bool,
    pub contacts: usize,
}

struct Session<G> {
    name: String,
    time_step: f64,
    step_limit: Option<u64>,
    steps: u64,
    bodies: Vec<ControlledBody>,
    pairs: PairRegistry<G>,
    state: Arc<WorldState>,
    scene: Option<Box<dyn SceneSink>>,
}

impl<G> Session<G> {
    /// Derived from the step counter so repeated steps never accumulate drift.
    fn time(&self) -> f64 {
        self.steps as f64 * self.time_step
    }
}

/// Orchestrates one simulation session over a dynamics world and a collision
/// engine.
///
/// Each simulator is independent; several can run side by side in one
/// process. `step` and `stop_simulation` take `&mut self`, so calls are
/// serialized by construction.
pub struct Simulator<W, C>
where
    W: DynamicsWorld,
    C: CollisionEngine<W>,
{
    world: W,
    collision: C,
    config: SimulatorConfig,
    session: Option<Session<C::Geometry>>,
    timings: PhaseTimings,
    diagnostics: StepDiagnostics,
}

impl<W, C> Simulator<W, C>
where
    W: DynamicsWorld,
    C: CollisionEngine<W>,
{
    pub fn new(world: W, collision: C, config: SimulatorConfig) -> Self {
        Self {
            world,
            collision,
            config,
            session: None,
            timings: PhaseTimings::default(),
            diagnostics: StepDiagnostics::default(),
        }
    }

    /// Start a session: build every body through `factory`, register the
    /// project's collision pairs and capture the initial state.
    ///
    /// Any previous session is stopped first. On error nothing of the new
    /// session survives and the simulator stays uninitialized.
    pub fn init<F>(
        &mut self,
        project: &Project,
        factory: &mut F,
        scene: Option<Box<dyn SceneSink>>,
    ) -> Result<(), InitError>
    where
        F: BodyFactory<W::Body> + ?Sized,
    {
        let _span = tracing::info_span!("init", project = %project.name).entered();
        self.stop_simulation();
        self.timings.reset();
        self.diagnostics = StepDiagnostics::default();

        match self.build_session(project, factory, scene) {
            Ok(session) => {
                tracing::info!(
                    bodies = session.bodies.len(),
                    pairs = session.pairs.len(),
                    time_step = session.time_step,
                    "simulation initialized"
                );
                self.session = Some(session);
                Ok(())
            }
            Err(e) => {
                self.world.clear();
                tracing::error!(error = %e, "initialization failed");
                Err(e)
            }
        }
    }

    fn build_session<F>(
        &mut self,
        project: &Project,
        factory: &mut F,
        scene: Option<Box<dyn SceneSink>>,
    ) -> Result<Session<C::Geometry>, InitError>
    where
        F: BodyFactory<W::Body> + ?Sized,
    {
        project.validate()?;
        self.world.reset(&project.world)?;

        let mut handles: BTreeMap<&str, BodyHandle> = BTreeMap::new();
        let mut bodies = Vec::with_capacity(project.bodies.len());
        for spec in &project.bodies {
            if handles.contains_key(spec.name.as_str()) {
                return Err(InitError::DuplicateBody(spec.name.clone()));
            }
            let built = factory.build(spec).map_err(|source| InitError::Factory {
                body: spec.name.clone(),
                source,
            })?;
            let handle = self.world.add_body(&spec.name, built.body)?;
            tracing::debug!(body = %spec.name, %handle, receivers = built.receivers.len(), "body added");
            handles.insert(&spec.name, handle);
            bodies.push(ControlledBody::new(spec.name.clone(), handle, built.receivers));
        }

        let mut pairs = PairRegistry::new();
        for pair_spec in &project.collision_pairs {
            let label = pair_spec.label();
            let a = self.resolve_link(&handles, &pair_spec.a, &label)?;
            let b = self.resolve_link(&handles, &pair_spec.b, &label)?;
            pairs.admit(a, b, &label)?;
            let (first, second) = if b < a {
                ((b, pair_spec.b.clone()), (a, pair_spec.a.clone()))
            } else {
                ((a, pair_spec.a.clone()), (b, pair_spec.b.clone()))
            };
            let geometry = self
                .collision
                .prepare(&self.world, first.0, second.0)
                .map_err(|source| InitError::Collision {
                    pair: label.clone(),
                    source,
                })?;
            pairs.insert(LinkPair::new(first, second, pair_spec.contact, geometry))?;
        }

        let mut state = self.world.capture_state();
        state.time = 0.0;
        state.step = 0;

        Ok(Session {
            name: project.name.clone(),
            time_step: project.time_step,
            step_limit: project.step_limit(),
            steps: 0,
            bodies,
            pairs,
            state: Arc::new(state),
            scene,
        })
    }

    fn resolve_link(
        &self,
        handles: &BTreeMap<&str, BodyHandle>,
        link: &LinkRef,
        label: &str,
    ) -> Result<LinkId, InitError> {
        let body = *handles
            .get(link.body.as_str())
            .ok_or_else(|| InitError::UnknownBody {
                pair: label.to_string(),
                body: link.body.clone(),
            })?;
        let index = self
            .world
            .link_index(body, &link.link)
            .ok_or_else(|| InitError::UnknownLink {
                pair: label.to_string(),
                body: link.body.clone(),
                link: link.link.clone(),
            })?;
        Ok(LinkId::new(body, index))
    }

    /// End the session and release bodies, receivers, pairs and the scene sink.
    /// Calling it again, or before `init`, does nothing.
    pub fn stop_simulation(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::info!(
                project = %session.name,
                steps = session.steps,
                time = session.time(),
                "simulation stopped"
            );
            drop(session);
            self.world.clear();
        }
    }

    /// Run one step and report whether the driver should keep going.
    ///
    /// `false` means the step did not commit (or the session has reached its
    /// total time); the cause is logged and reflected in [`diagnostics`].
    ///
    /// [`diagnostics`]: Simulator::diagnostics
    pub fn one_step(&mut self) -> bool {
        match self.step() {
            Ok(_) => true,
            Err(StepError::SessionComplete { time }) => {
                tracing::info!(time, "session complete");
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "step failed");
                false
            }
        }
    }

    /// Run one step: control, collision, dynamics, then commit.
    ///
    /// On error nothing is committed: the published state and the simulation
    /// time are exactly as before the call, and the world is rolled back.
    pub fn step(&mut self) -> Result<StepReport, StepError> {
        let Self {
            world,
            collision,
            config,
            session,
            timings,
            diagnostics,
        } = self;
        let session = session.as_mut().ok_or(StepError::NotInitialized)?;
        if session.step_limit.is_some_and(|limit| session.steps >= limit) {
            return Err(StepError::SessionComplete {
                time: session.time(),
            });
        }
        let _span = tracing::debug_span!("step", step = session.steps).entered();

        match Self::run_phases(world, collision, config, timings, diagnostics, session) {
            Ok((next, degraded, contacts)) => {
                session.steps += 1;
                session.state = Arc::new(next);
                diagnostics.steps_completed += 1;
                if degraded {
                    diagnostics.steps_degraded += 1;
                    tracing::warn!(step = session.steps, "step completed with held control values");
                }

                if let Some(scene) = session.scene.as_mut() {
                    if let Err(e) = scene.publish(&session.state) {
                        diagnostics.scene_failures += 1;
                        tracing::warn!(error = %e, "scene notification failed");
                    }
                }

                Ok(StepReport {
                    step: session.steps,
                    time: session.time(),
                    degraded,
                    contacts,
                })
            }
            Err(e) => {
                diagnostics.steps_failed += 1;
                if let Err(restore) = world.restore_state(&session.state) {
                    diagnostics.rollback_failures += 1;
                    tracing::error!(error = %restore, "rollback after failed step did not complete");
                }
                Err(e)
            }
        }
    }

    /// Phases 1–4. Returns the captured next state, whether any receiver
    /// faulted, and the contact count.
    fn run_phases(
        world: &mut W,
        collision: &C,
        config: &SimulatorConfig,
        timings: &mut PhaseTimings,
        diagnostics: &mut StepDiagnostics,
        session: &mut Session<C::Geometry>,
    ) -> Result<(WorldState, bool, usize), StepError> {
        let start = Instant::now();
        let control = Self::control_phase(world, config, diagnostics, session);
        timings.control.record(start.elapsed());
        let degraded = control?;

        let start = Instant::now();
        let mut contacts = Vec::new();
        let detected = detect_contacts::<W, C>(collision, &session.pairs, &session.state, &mut contacts);
        timings.collision.record(start.elapsed());
        detected?;

        let start = Instant::now();
        let advanced = world.advance(session.time_step, &contacts);
        timings.dynamics.record(start.elapsed());
        advanced?;

        let mut next = world.capture_state();
        next.step = session.steps + 1;
        next.time = next.step as f64 * session.time_step;
        if config.check_finite_state {
            if let Some(body) = next.first_non_finite_body() {
                return Err(DynamicsError::NonFinite {
                    body: body.to_string(),
                }
                .into());
            }
        }

        tracing::debug!(contacts = contacts.len(), time = next.time, "phases complete");
        Ok((next, degraded, contacts.len()))
    }

    fn control_phase(
        world: &mut W,
        config: &SimulatorConfig,
        diagnostics: &mut StepDiagnostics,
        session: &mut Session<C::Geometry>,
    ) -> Result<bool, StepError> {
        let mut degraded = false;
        let time = session.time();
        for body in &mut session.bodies {
            let ctx = TickContext {
                body: body.handle(),
                time,
                step: session.steps,
                time_step: session.time_step,
                timeout: config.receiver_timeout(),
                state: Arc::clone(&session.state),
            };
            for fault in body.tick(&ctx) {
                degraded = true;
                match &fault.error {
                    ReceiverError::Timeout(_) => diagnostics.receiver_timeouts += 1,
                    ReceiverError::Disconnected | ReceiverError::Failed(_) => {
                        diagnostics.receiver_failures += 1
                    }
                }
                tracing::warn!(
                    body = body.name(),
                    receiver = %fault.receiver,
                    error = %fault.error,
                    "controller did not deliver"
                );
                if config.strict_controllers {
                    return Err(match fault.error {
                        ReceiverError::Timeout(timeout) => StepError::ControllerTimeout {
                            body: body.name().to_string(),
                            receiver: fault.receiver,
                            timeout,
                        },
                        other => StepError::ControllerFailed {
                            body: body.name().to_string(),
                            receiver: fault.receiver,
                            reason: other.to_string(),
                        },
                    });
                }
            }
            for output in body.held_outputs() {
                world.apply_control(body.handle(), output)?;
            }
        }
        Ok(degraded)
    }

    /// Query contacts over every registered pair against the current state.
    ///
    /// `out` is cleared, then receives one entry per pair in contact, in pair
    /// registration order. Does not advance time; calling it twice without a
    /// step in between yields identical output.
    pub fn check_collision(&mut self, out: &mut Vec<Collision>) -> Result<(), CollisionError> {
        out.clear();
        let Some(session) = self.session.as_ref() else {
            return Ok(());
        };
        let start = Instant::now();
        let result = detect_contacts::<W, C>(&self.collision, &session.pairs, &session.state, out);
        self.timings.collision.record(start.elapsed());
        result
    }

    pub fn is_initialized(&self) -> bool {
        self.session.is_some()
    }

    /// Cumulative simulation time; zero outside a session.
    pub fn time(&self) -> f64 {
        self.session.as_ref().map_or(0.0, Session::time)
    }

    pub fn steps(&self) -> u64 {
        self.session.as_ref().map_or(0, |s| s.steps)
    }

    pub fn time_step(&self) -> Option<f64> {
        self.session.as_ref().map(|s| s.time_step)
    }

    pub fn project_name(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.name.as_str())
    }

    /// The last committed world state.
    pub fn state(&self) -> Option<&Arc<WorldState>> {
        self.session.as_ref().map(|s| &s.state)
    }

    pub fn bodies(&self) -> &[ControlledBody] {
        self.session.as_ref().map_or(&[], |s| s.bodies.as_slice())
    }

    pub fn pair_count(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.pairs.len())
    }

    /// Pair labels in registration order.
    pub fn pair_labels(&self) -> Vec<String> {
        self.session
            .as_ref()
            .map(|s| s.pairs.iter().map(LinkPair::label).collect())
            .unwrap_or_default()
    }

    pub fn timings(&self) -> &PhaseTimings {
        &self.timings
    }

    pub fn diagnostics(&self) -> &StepDiagnostics {
        &self.diagnostics
    }

    /// Read-only access to the dynamics world.
    pub fn world(&self) -> &W {
        &self.world
    }
}

fn detect_contacts<W, C>(
    collision: &C,
    pairs: &PairRegistry<C::Geometry>,
    state: &WorldState,
    out: &mut Vec<Collision>,
) -> Result<(), CollisionError>
where
    W: DynamicsWorld,
    C: CollisionEngine<W>,
{
    for (index, pair) in pairs.iter().enumerate() {
        let points = match collision.detect(state, pair) {
            Ok(points) => points,
            Err(e) => {
                out.clear();
                return Err(e);
            }
        };
        if !points.is_empty() {
            out.push(Collision {
                pair: index,
                a: pair.a,
                b: pair.b,
                params: pair.params,
                points,
            });
        }
    }
    Ok(())
}
