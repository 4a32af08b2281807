use glam::DVec3;
use std::thread;
use std::time::Duration;
use stepsim_kernel::{
    BodyFactory, BodySpec, BuiltBody, ClockReceiver, ControlOutput, Controller, ControllerSpec,
    FactoryError, LocalReceiver, ThreadedReceiver, TickContext,
};

use crate::model::ModelLibrary;
use crate::world::RigidBody;

/// PD controller holding a body's first link at a target position.
///
/// Writes all three actuators every tick. `lift` is added to the z force,
/// typically `mass * g` to cancel gravity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoldController {
    pub target: DVec3,
    pub kp: f64,
    pub kd: f64,
    pub lift: f64,
}

impl Controller for HoldController {
    fn control(&mut self, ctx: &TickContext) -> ControlOutput {
        let Some(root) = ctx.state.body(ctx.body).and_then(|b| b.links.first()) else {
            return ControlOutput::new();
        };
        let error = self.target - root.transform.position;
        let force = error * self.kp - root.linear_velocity * self.kd + DVec3::new(0.0, 0.0, self.lift);
        ControlOutput::new()
            .with(0, force.x)
            .with(1, force.y)
            .with(2, force.z)
    }
}

/// Controller that blocks for `delay` on every `every`-th tick, then sends
/// nothing.
struct StallController {
    delay: Duration,
    every: u64,
}

impl Controller for StallController {
    fn control(&mut self, ctx: &TickContext) -> ControlOutput {
        if ctx.step % self.every == 0 {
            thread::sleep(self.delay);
        }
        ControlOutput::new()
    }
}

/// Controller kinds understood by [`ReferenceFactory`].
pub const CONTROLLER_KINDS: &[&str] = &["hold", "constant", "stall"];

/// Builds [`RigidBody`] values from a [`ModelLibrary`].
///
/// Controller kinds:
/// - `hold`: [`HoldController`]; params `kp`, `kd`, `lift`, and `x`/`y`/`z`
///   (target, defaults to the body's initial position).
/// - `constant`: one actuator at a fixed value; params `actuator`, `value`.
/// - `stall`: always on its own thread; sleeps `delay_ms` every `every` ticks.
///
/// `hold` and `constant` run on the simulator thread unless threaded
/// controllers are enabled.
#[derive(Debug, Clone)]
pub struct ReferenceFactory {
    library: ModelLibrary,
    threaded: bool,
}

impl ReferenceFactory {
    pub fn new(library: ModelLibrary) -> Self {
        Self {
            library,
            threaded: false,
        }
    }

    pub fn with_threaded_controllers(mut self, threaded: bool) -> Self {
        self.threaded = threaded;
        self
    }

    pub fn library(&self) -> &ModelLibrary {
        &self.library
    }

    fn receiver(&self, spec: &BodySpec, c: &ControllerSpec) -> Result<Box<dyn ClockReceiver>, FactoryError> {
        match c.kind.as_str() {
            "hold" => {
                let hold = HoldController {
                    target: DVec3::new(
                        c.param("x", spec.position.x),
                        c.param("y", spec.position.y),
                        c.param("z", spec.position.z),
                    ),
                    kp: non_negative(c, "kp", 50.0)?,
                    kd: non_negative(c, "kd", 10.0)?,
                    lift: finite(c, "lift", 0.0)?,
                };
                if !hold.target.is_finite() {
                    return Err(invalid("x/y/z", "target must be finite"));
                }
                self.host(&c.name, hold, self.threaded)
            }
            "constant" => {
                let actuator = finite(c, "actuator", 0.0)?;
                if !(0.0..3.0).contains(&actuator) || actuator.fract() != 0.0 {
                    return Err(invalid("actuator", "must be 0, 1 or 2"));
                }
                let value = finite(c, "value", 0.0)?;
                let actuator = actuator as usize;
                self.host(
                    &c.name,
                    move |_: &TickContext| ControlOutput::new().with(actuator, value),
                    self.threaded,
                )
            }
            "stall" => {
                let delay_ms = non_negative(c, "delay_ms", 1000.0)?;
                let every = non_negative(c, "every", 1.0)?;
                if every < 1.0 {
                    return Err(invalid("every", "must be at least 1"));
                }
                let stall = StallController {
                    delay: Duration::from_secs_f64(delay_ms / 1000.0),
                    every: every as u64,
                };
                self.host(&c.name, stall, true)
            }
            other => Err(FactoryError::UnknownController {
                name: c.name.clone(),
                kind: other.to_string(),
            }),
        }
    }

    fn host<C: Controller>(
        &self,
        name: &str,
        mut controller: C,
        threaded: bool,
    ) -> Result<Box<dyn ClockReceiver>, FactoryError> {
        if threaded {
            let receiver = ThreadedReceiver::spawn(name, controller).map_err(|source| FactoryError::Spawn {
                name: name.to_string(),
                source,
            })?;
            Ok(Box::new(receiver))
        } else {
            Ok(Box::new(LocalReceiver::new(name, move |ctx: &TickContext| {
                controller.control(ctx)
            })))
        }
    }
}

fn invalid(param: &str, reason: &str) -> FactoryError {
    FactoryError::InvalidParameter {
        param: param.to_string(),
        reason: reason.to_string(),
    }
}

fn finite(c: &ControllerSpec, key: &str, default: f64) -> Result<f64, FactoryError> {
    let value = c.param(key, default);
    if value.is_finite() {
        Ok(value)
    } else {
        Err(invalid(key, "must be finite"))
    }
}

fn non_negative(c: &ControllerSpec, key: &str, default: f64) -> Result<f64, FactoryError> {
    let value = finite(c, key, default)?;
    if value < 0.0 {
        return Err(invalid(key, "must not be negative"));
    }
    Ok(value)
}

impl BodyFactory<RigidBody> for ReferenceFactory {
    fn build(&mut self, spec: &BodySpec) -> Result<BuiltBody<RigidBody>, FactoryError> {
        let model = self
            .library
            .get(&spec.model)
            .ok_or_else(|| FactoryError::UnknownModel(spec.model.clone()))?;
        let body = RigidBody {
            model: model.clone(),
            position: spec.position,
            velocity: spec.velocity,
        };
        let receivers = spec
            .controllers
            .iter()
            .map(|c| self.receiver(spec, c))
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(body = %spec.name, model = %spec.model, receivers = receivers.len(), "built body");
        Ok(BuiltBody { body, receivers })
    }
}
