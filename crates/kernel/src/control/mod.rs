//! Controller bridging: clock receivers and the bodies they drive.
//!
//! A [`ClockReceiver`] is ticked once per step with the state committed by the
//! previous step and must answer within the tick's timeout. Its last good
//! answer is held, so a late or failed controller keeps its previous command
//! in force instead of stalling the simulation.

mod threaded;

pub use threaded::{Controller, ThreadedReceiver};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use stepsim_common::BodyHandle;

use crate::state::WorldState;

/// One actuator input, e.g. a joint torque or an axis force.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActuatorCommand {
    pub actuator: usize,
    pub value: f64,
}

/// Everything a controller asks of its body for one step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlOutput {
    pub commands: Vec<ActuatorCommand>,
}

impl ControlOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, actuator: usize, value: f64) -> Self {
        self.commands.push(ActuatorCommand { actuator, value });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// What a receiver sees on each tick.
#[derive(Debug, Clone)]
pub struct TickContext {
    pub body: BodyHandle,
    /// Simulation time of `state`.
    pub time: f64,
    /// Index of the step about to run (first step is 0).
    pub step: u64,
    pub time_step: f64,
    pub timeout: Duration,
    pub state: Arc<WorldState>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReceiverError {
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("controller disconnected")]
    Disconnected,
    #[error("controller failed: {0}")]
    Failed(String),
}

/// One controller's per-step tick contract.
pub trait ClockReceiver {
    fn name(&self) -> &str;

    /// Run one control cycle. Implementations should return within
    /// `ctx.timeout`; an answer that arrives later is discarded and counted as
    /// a timeout by the owning [`ControlledBody`].
    fn tick(&mut self, ctx: &TickContext) -> Result<ControlOutput, ReceiverError>;
}

/// In-process receiver backed by a closure.
///
/// The closure runs on the simulator thread and cannot be interrupted, so an
/// overrun is only detected once it returns.
pub struct LocalReceiver<F> {
    name: String,
    control: F,
}

impl<F> LocalReceiver<F>
where
    F: FnMut(&TickContext) -> ControlOutput,
{
    pub fn new(name: impl Into<String>, control: F) -> Self {
        Self {
            name: name.into(),
            control,
        }
    }
}

impl<F> ClockReceiver for LocalReceiver<F>
where
    F: FnMut(&TickContext) -> ControlOutput,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self, ctx: &TickContext) -> Result<ControlOutput, ReceiverError> {
        Ok((self.control)(ctx))
    }
}

/// A receiver plus its held output and fault counters.
pub struct ReceiverSlot {
    receiver: Box<dyn ClockReceiver>,
    held: Option<ControlOutput>,
    timeouts: u64,
    failures: u64,
}

impl ReceiverSlot {
    fn new(receiver: Box<dyn ClockReceiver>) -> Self {
        Self {
            receiver,
            held: None,
            timeouts: 0,
            failures: 0,
        }
    }

    pub fn name(&self) -> &str {
        self.receiver.name()
    }

    /// Last output this receiver produced successfully.
    pub fn held(&self) -> Option<&ControlOutput> {
        self.held.as_ref()
    }

    pub fn timeouts(&self) -> u64 {
        self.timeouts
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }
}

/// A receiver that did not deliver on this tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiverFault {
    pub receiver: String,
    pub error: ReceiverError,
}

/// One simulated robot: a handle into the dynamics world plus its receivers.
///
/// The dynamics world owns the body's physical state; this only carries the
/// control side. Receivers tick in the order they were attached.
pub struct ControlledBody {
    name: String,
    handle: BodyHandle,
    slots: Vec<ReceiverSlot>,
}

impl ControlledBody {
    pub fn new(
        name: impl Into<String>,
        handle: BodyHandle,
        receivers: Vec<Box<dyn ClockReceiver>>,
    ) -> Self {
        Self {
            name: name.into(),
            handle,
            slots: receivers.into_iter().map(ReceiverSlot::new).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> BodyHandle {
        self.handle
    }

    pub fn receivers(&self) -> &[ReceiverSlot] {
        &self.slots
    }

    /// Whether the body has no controllers at all.
    pub fn is_passive(&self) -> bool {
        self.slots.is_empty()
    }

    /// Tick every receiver once. Successful outputs replace the held value;
    /// faults leave it untouched and are returned. An output delivered after
    /// `ctx.timeout` is dropped as a timeout.
    pub fn tick(&mut self, ctx: &TickContext) -> Vec<ReceiverFault> {
        let mut faults = Vec::new();
        for slot in &mut self.slots {
            let start = Instant::now();
            let result = match slot.receiver.tick(ctx) {
                Ok(_) if start.elapsed() > ctx.timeout => Err(ReceiverError::Timeout(ctx.timeout)),
                other => other,
            };
            match result {
                Ok(output) => slot.held = Some(output),
                Err(error) => {
                    match error {
                        ReceiverError::Timeout(_) => slot.timeouts += 1,
                        ReceiverError::Disconnected | ReceiverError::Failed(_) => {
                            slot.failures += 1
                        }
                    }
                    tracing::debug!(
                        body = %self.name,
                        receiver = slot.receiver.name(),
                        %error,
                        "receiver fault, holding previous output"
                    );
                    faults.push(ReceiverFault {
                        receiver: slot.receiver.name().to_string(),
                        error,
                    });
                }
            }
        }
        faults
    }

    /// Held outputs in receiver order; receivers that never answered are skipped.
    pub fn held_outputs(&self) -> impl Iterator<Item = &ControlOutput> {
        self.slots.iter().filter_map(ReceiverSlot::held)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn ctx(step: u64) -> TickContext {
        TickContext {
            body: BodyHandle(0),
            time: step as f64 * 0.01,
            step,
            time_step: 0.01,
            timeout: Duration::from_millis(10),
            state: Arc::new(WorldState::default()),
        }
    }

    struct Late(&'static str);

    impl ClockReceiver for Late {
        fn name(&self) -> &str {
            self.0
        }

        fn tick(&mut self, ctx: &TickContext) -> Result<ControlOutput, ReceiverError> {
            Err(ReceiverError::Timeout(ctx.timeout))
        }
    }

    struct Broken(&'static str);

    impl ClockReceiver for Broken {
        fn name(&self) -> &str {
            self.0
        }

        fn tick(&mut self, _ctx: &TickContext) -> Result<ControlOutput, ReceiverError> {
            Err(ReceiverError::Failed("boom".into()))
        }
    }

    #[test]
    fn local_receiver_output_is_held() {
        let receiver = LocalReceiver::new("const", |_: &TickContext| ControlOutput::new().with(0, 2.5));
        let mut body = ControlledBody::new("bot", BodyHandle(0), vec![Box::new(receiver)]);
        assert!(body.tick(&ctx(0)).is_empty());
        let held: Vec<_> = body.held_outputs().collect();
        assert_eq!(held, vec![&ControlOutput::new().with(0, 2.5)]);
    }

    #[test]
    fn timeout_keeps_previous_output() {
        let healthy = LocalReceiver::new("healthy", |c: &TickContext| {
            ControlOutput::new().with(0, c.step as f64)
        });
        let mut body = ControlledBody::new(
            "bot",
            BodyHandle(0),
            vec![Box::new(healthy), Box::new(Late("late"))],
        );

        let faults = body.tick(&ctx(3));
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].receiver, "late");
        assert!(matches!(faults[0].error, ReceiverError::Timeout(_)));

        // Only the healthy receiver has something to hold.
        assert_eq!(body.held_outputs().count(), 1);
        assert_eq!(body.receivers()[1].timeouts(), 1);
        assert!(body.receivers()[1].held().is_none());
    }

    #[test]
    fn overrunning_local_receiver_counts_as_timeout() {
        let slow_after_first = LocalReceiver::new("slow", |c: &TickContext| {
            if c.step > 0 {
                thread::sleep(Duration::from_millis(40));
            }
            ControlOutput::new().with(0, c.step as f64 + 1.0)
        });
        let mut body = ControlledBody::new("bot", BodyHandle(0), vec![Box::new(slow_after_first)]);

        assert!(body.tick(&ctx(0)).is_empty());
        let faults = body.tick(&ctx(1));
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].error, ReceiverError::Timeout(Duration::from_millis(10)));
        assert_eq!(body.receivers()[0].timeouts(), 1);
        // The late answer (2.0) is dropped; the step-0 answer stays in force.
        assert_eq!(body.receivers()[0].held(), Some(&ControlOutput::new().with(0, 1.0)));
    }

    #[test]
    fn failure_counted_separately_from_timeout() {
        let mut body = ControlledBody::new("bot", BodyHandle(0), vec![Box::new(Broken("broken"))]);
        body.tick(&ctx(0));
        body.tick(&ctx(1));
        assert_eq!(body.receivers()[0].failures(), 2);
        assert_eq!(body.receivers()[0].timeouts(), 0);
    }

    #[test]
    fn passive_body_ticks_nothing() {
        let mut body = ControlledBody::new("rock", BodyHandle(4), Vec::new());
        assert!(body.is_passive());
        assert!(body.tick(&ctx(0)).is_empty());
        assert_eq!(body.held_outputs().count(), 0);
    }
}
