use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use glam::DVec3;
use stepsim_common::{BodyHandle, LinkRef};
use stepsim_kernel::{
    BodyFactory, BodySpec, BuiltBody, ClockReceiver, ControlOutput, ControllerSpec, DynamicsError,
    FactoryError, InitError, LocalReceiver, Project, Simulator, SimulatorConfig, StepError,
    TickContext,
};
use stepsim_test_utils::{FailingSink, MockBody, MockFactory, MockWorld, RecordingSink, ScriptedCollision};

type MockSim = Simulator<MockWorld, ScriptedCollision>;

fn sim() -> MockSim {
    Simulator::new(MockWorld::new(), ScriptedCollision::new(), SimulatorConfig::default())
}

fn pushing_project() -> Project {
    Project::new("push", 0.01).with_body(
        BodySpec::new("bot", "box").with_controller(
            ControllerSpec::new("push", "constant")
                .with_param("actuator", 0.0)
                .with_param("value", 2.0),
        ),
    )
}

#[test]
fn step_before_init_is_rejected() {
    let mut s = sim();
    assert!(matches!(s.step(), Err(StepError::NotInitialized)));
    assert!(!s.one_step());
    assert_eq!(s.time(), 0.0);
}

#[test]
fn control_applied_before_advance() {
    let mut s = sim();
    s.init(&pushing_project(), &mut MockFactory::new(), None).unwrap();
    let report = s.step().unwrap();
    assert_eq!(report.step, 1);
    assert!(!report.degraded);

    let applied = s.world().applied();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].0, BodyHandle(0));
    let state = s.state().unwrap();
    assert!(state.bodies[0].links[0].transform.position.x > 0.0);
    assert_eq!(state.bodies[0].actuator_efforts[0], 2.0);
}

#[test]
fn receivers_see_previous_committed_state() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_in = Arc::clone(&seen);
    let watcher = LocalReceiver::new("watch", move |ctx: &TickContext| {
        seen_in.lock().unwrap().push((ctx.step, ctx.time, ctx.state.step));
        ControlOutput::new()
    });
    let mut factory = SingleReceiverFactory(Some(Box::new(watcher)));

    let mut s = sim();
    let project = Project::new("obs", 0.5).with_body(BodySpec::new("bot", "box"));
    s.init(&project, &mut factory, None).unwrap();
    s.step().unwrap();
    s.step().unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![(0, 0.0, 0), (1, 0.5, 1)]);
}

struct SingleReceiverFactory(Option<Box<dyn ClockReceiver>>);

impl BodyFactory<MockBody> for SingleReceiverFactory {
    fn build(&mut self, _spec: &BodySpec) -> Result<BuiltBody<MockBody>, FactoryError> {
        Ok(BuiltBody {
            body: MockBody::new(&["root"]),
            receivers: self.0.take().into_iter().collect(),
        })
    }
}

#[test]
fn init_failure_leaves_simulator_uninitialized() {
    let mut s = sim();
    s.init(&pushing_project(), &mut MockFactory::new(), None).unwrap();
    s.step().unwrap();

    let bad = Project::new("bad", 0.01)
        .with_body(BodySpec::new("a", "box"))
        .with_body(BodySpec::new("b", "teapot"));
    let err = s.init(&bad, &mut MockFactory::new(), None).unwrap_err();
    assert!(matches!(err, InitError::Factory { ref body, .. } if body == "b"));
    assert!(!s.is_initialized());
    assert_eq!(s.world().body_count(), 0);
    assert!(matches!(s.step(), Err(StepError::NotInitialized)));
}

#[test]
fn duplicate_body_names_rejected() {
    let mut s = sim();
    let project = Project::new("dup", 0.01)
        .with_body(BodySpec::new("a", "box"))
        .with_body(BodySpec::new("a", "box"));
    let err = s.init(&project, &mut MockFactory::new(), None).unwrap_err();
    assert!(matches!(err, InitError::DuplicateBody(ref n) if n == "a"));
}

#[test]
fn unknown_link_and_body_in_pair_rejected() {
    let mut s = sim();
    let base = Project::new("p", 0.01).with_body(BodySpec::new("a", "arm"));

    let unknown_link = base
        .clone()
        .with_pair(LinkRef::new("a", "root"), LinkRef::new("a", "elbow"));
    let err = s.init(&unknown_link, &mut MockFactory::new(), None).unwrap_err();
    assert!(matches!(err, InitError::UnknownLink { ref link, .. } if link == "elbow"));

    let unknown_body = base.with_pair(LinkRef::new("a", "root"), LinkRef::new("z", "root"));
    let err = s.init(&unknown_body, &mut MockFactory::new(), None).unwrap_err();
    assert!(matches!(err, InitError::UnknownBody { ref body, .. } if body == "z"));
    assert!(!s.is_initialized());
}

#[test]
fn duplicate_pair_rejected_at_init() {
    let mut s = sim();
    let project = Project::new("p", 0.01)
        .with_body(BodySpec::new("a", "box"))
        .with_body(BodySpec::new("b", "box"))
        .with_pair(LinkRef::new("a", "root"), LinkRef::new("b", "root"))
        .with_pair(LinkRef::new("b", "root"), LinkRef::new("a", "root"));
    let err = s.init(&project, &mut MockFactory::new(), None).unwrap_err();
    assert!(matches!(err, InitError::DuplicatePair(_)));
}

#[test]
fn strict_mode_fails_step_on_timeout() {
    let mut s = Simulator::new(
        MockWorld::new(),
        ScriptedCollision::new(),
        SimulatorConfig::default().strict(),
    );
    let project = Project::new("strict", 0.01).with_body(
        BodySpec::new("bot", "box").with_controller(ControllerSpec::new("late", "timeout")),
    );
    s.init(&project, &mut MockFactory::new(), None).unwrap();
    let err = s.step().unwrap_err();
    assert!(matches!(err, StepError::ControllerTimeout { ref receiver, .. } if receiver == "late"));
    assert_eq!(s.time(), 0.0);
    assert_eq!(s.world().advance_calls(), 0);
    assert_eq!(s.diagnostics().steps_failed, 1);
}

#[test]
fn strict_mode_fails_step_on_controller_error() {
    let mut s = Simulator::new(
        MockWorld::new(),
        ScriptedCollision::new(),
        SimulatorConfig::default().strict(),
    );
    let project = Project::new("strict", 0.01).with_body(
        BodySpec::new("bot", "box").with_controller(ControllerSpec::new("broken", "fail")),
    );
    s.init(&project, &mut MockFactory::new(), None).unwrap();
    assert!(matches!(s.step(), Err(StepError::ControllerFailed { .. })));
    assert_eq!(s.diagnostics().receiver_failures, 1);
}

#[test]
fn invalid_actuator_fails_step_without_commit() {
    let mut s = sim();
    let project = Project::new("p", 0.01).with_body(
        BodySpec::new("bot", "box").with_controller(
            ControllerSpec::new("wild", "constant").with_param("actuator", 7.0),
        ),
    );
    s.init(&project, &mut MockFactory::new(), None).unwrap();
    assert!(matches!(
        s.step(),
        Err(StepError::Dynamics(DynamicsError::InvalidActuator { actuator: 7, .. }))
    ));
    assert_eq!(s.steps(), 0);
}

#[test]
fn collision_failure_is_fatal_to_step() {
    let mut s = Simulator::new(
        MockWorld::new(),
        ScriptedCollision::new().malformed("hand"),
        SimulatorConfig::default(),
    );
    let project = Project::new("p", 0.01)
        .with_body(BodySpec::new("a", "arm"))
        .with_pair(LinkRef::new("a", "root"), LinkRef::new("a", "hand"));
    s.init(&project, &mut MockFactory::new(), None).unwrap();
    let before = Arc::clone(s.state().unwrap());
    assert!(matches!(s.step(), Err(StepError::Collision(_))));
    assert_eq!(s.world().advance_calls(), 0);
    assert_eq!(**s.state().unwrap(), *before);
}

#[test]
fn contacts_are_passed_to_advance() {
    let mut s = Simulator::new(
        MockWorld::new(),
        ScriptedCollision::new().touching("root", "hand"),
        SimulatorConfig::default(),
    );
    let project = Project::new("p", 0.01)
        .with_body(BodySpec::new("a", "arm"))
        .with_pair(LinkRef::new("a", "root"), LinkRef::new("a", "hand"));
    s.init(&project, &mut MockFactory::new(), None).unwrap();
    let report = s.step().unwrap();
    assert_eq!(report.contacts, 1);
    assert_eq!(s.world().contacts_seen(), &[1]);
}

#[test]
fn scene_sink_receives_each_committed_state() {
    let mut s = sim();
    let (sink, seen) = RecordingSink::observed();
    s.init(&pushing_project(), &mut MockFactory::new(), Some(Box::new(sink)))
        .unwrap();
    for _ in 0..3 {
        assert!(s.one_step());
    }
    assert_eq!(seen.times(), vec![0.01, 0.02, 3.0 * 0.01]);
}

#[test]
fn failing_scene_sink_does_not_fail_step() {
    let mut s = sim();
    s.init(&pushing_project(), &mut MockFactory::new(), Some(Box::new(FailingSink)))
        .unwrap();
    assert!(s.one_step());
    assert!(s.one_step());
    assert_eq!(s.diagnostics().scene_failures, 2);
    assert_eq!(s.steps(), 2);
}

#[test]
fn total_time_ends_session() {
    let mut s = sim();
    let project = pushing_project().with_total_time(0.03);
    s.init(&project, &mut MockFactory::new(), None).unwrap();
    assert!(s.one_step());
    assert!(s.one_step());
    assert!(s.one_step());
    assert!(!s.one_step());
    assert!(matches!(s.step(), Err(StepError::SessionComplete { .. })));
    assert_eq!(s.steps(), 3);
    assert_eq!(s.diagnostics().steps_failed, 0);
}

#[test]
fn non_finite_state_is_rejected() {
    let mut s = sim();
    let mut project = Project::new("nan", 0.01).with_body(BodySpec::new("bot", "box"));
    project.bodies[0].velocity = DVec3::new(f64::NAN, 0.0, 0.0);
    s.init(&project, &mut MockFactory::new(), None).unwrap();
    assert!(matches!(
        s.step(),
        Err(StepError::Dynamics(DynamicsError::NonFinite { ref body })) if body == "bot"
    ));
    assert_eq!(s.steps(), 0);
}

#[test]
fn timings_recorded_per_phase() {
    let mut s = sim();
    s.init(&pushing_project(), &mut MockFactory::new(), None).unwrap();
    s.step().unwrap();
    s.step().unwrap();
    let mut out = Vec::new();
    s.check_collision(&mut out).unwrap();

    assert_eq!(s.timings().control.count(), 2);
    assert_eq!(s.timings().dynamics.count(), 2);
    assert_eq!(s.timings().collision.count(), 3);
    assert!(s.timings().dynamics.mean_duration().is_some());
}

#[test]
fn world_settings_reach_the_world() {
    let mut s = sim();
    let mut project = pushing_project();
    project.world.gravity = DVec3::new(0.0, 0.0, -1.62);
    s.init(&project, &mut MockFactory::new(), None).unwrap();
    assert_eq!(s.world().settings().unwrap().gravity.z, -1.62);
    assert_eq!(s.project_name(), Some("push"));
    assert_eq!(s.time_step(), Some(0.01));
}

/// Hands out one receiver per body, in build order.
struct QueuedReceiverFactory(Vec<Box<dyn ClockReceiver>>);

impl BodyFactory<MockBody> for QueuedReceiverFactory {
    fn build(&mut self, _spec: &BodySpec) -> Result<BuiltBody<MockBody>, FactoryError> {
        let receivers = if self.0.is_empty() {
            Vec::new()
        } else {
            vec![self.0.remove(0)]
        };
        Ok(BuiltBody {
            body: MockBody::new(&["root"]),
            receivers,
        })
    }
}

/// Answers immediately on the first tick, then overruns every later one.
fn slow_after_first_tick() -> Box<dyn ClockReceiver> {
    Box::new(LocalReceiver::new("slow", |ctx: &TickContext| {
        if ctx.step > 0 {
            thread::sleep(Duration::from_millis(40));
        }
        ControlOutput::new().with(0, ctx.step as f64 + 1.0)
    }))
}

fn overrun_config() -> SimulatorConfig {
    SimulatorConfig::default().with_receiver_timeout(Duration::from_millis(5))
}

#[test]
fn strict_mode_fails_step_on_local_overrun() {
    let mut s = Simulator::new(MockWorld::new(), ScriptedCollision::new(), overrun_config().strict());
    let project = Project::new("strict", 0.01).with_body(BodySpec::new("bot", "box"));
    s.init(&project, &mut QueuedReceiverFactory(vec![slow_after_first_tick()]), None)
        .unwrap();

    s.step().unwrap();
    let err = s.step().unwrap_err();
    assert!(matches!(err, StepError::ControllerTimeout { ref receiver, .. } if receiver == "slow"));
    assert_eq!(s.steps(), 1);
    assert_eq!(s.world().advance_calls(), 1);
    assert_eq!(s.diagnostics().receiver_timeouts, 1);
}

#[test]
fn lenient_mode_holds_output_over_local_overrun() {
    let mut s = Simulator::new(MockWorld::new(), ScriptedCollision::new(), overrun_config());
    let project = Project::new("lenient", 0.01).with_body(BodySpec::new("bot", "box"));
    s.init(&project, &mut QueuedReceiverFactory(vec![slow_after_first_tick()]), None)
        .unwrap();

    assert!(!s.step().unwrap().degraded);
    assert!(s.step().unwrap().degraded);
    assert_eq!(s.diagnostics().receiver_timeouts, 1);
    assert_eq!(s.diagnostics().steps_degraded, 1);
    // The late step-1 answer (2.0) never reaches the world.
    let applied: Vec<f64> = s.world().applied().iter().map(|(_, o)| o.commands[0].value).collect();
    assert_eq!(applied, vec![1.0, 1.0]);
}

type TickLog = Arc<Mutex<Vec<String>>>;

/// Builds bodies whose receivers record `body/receiver@step` on each tick and
/// command actuator 0 with a value unique to the receiver.
struct RecordingReceiverFactory {
    log: TickLog,
    next_value: f64,
}

impl BodyFactory<MockBody> for RecordingReceiverFactory {
    fn build(&mut self, spec: &BodySpec) -> Result<BuiltBody<MockBody>, FactoryError> {
        let mut receivers: Vec<Box<dyn ClockReceiver>> = Vec::new();
        for c in &spec.controllers {
            self.next_value += 1.0;
            let value = self.next_value;
            let label = format!("{}/{}", spec.name, c.name);
            let log = Arc::clone(&self.log);
            receivers.push(Box::new(LocalReceiver::new(c.name.clone(), move |ctx: &TickContext| {
                log.lock().unwrap().push(format!("{label}@{}", ctx.step));
                ControlOutput::new().with(0, value)
            })));
        }
        Ok(BuiltBody {
            body: MockBody::new(&["root"]),
            receivers,
        })
    }
}

#[test]
fn bodies_and_receivers_tick_in_declaration_order() {
    let body = |name: &str| {
        BodySpec::new(name, "box")
            .with_controller(ControllerSpec::new("first", "recorded"))
            .with_controller(ControllerSpec::new("second", "recorded"))
    };
    let project = Project::new("order", 0.01)
        .with_body(body("zeta"))
        .with_body(body("alpha"))
        .with_body(body("mid"));
    let log = TickLog::default();
    let mut factory = RecordingReceiverFactory {
        log: Arc::clone(&log),
        next_value: 0.0,
    };

    let mut s = sim();
    s.init(&project, &mut factory, None).unwrap();
    for _ in 0..3 {
        s.step().unwrap();
    }

    let expected: Vec<String> = (0..3)
        .flat_map(|step| {
            ["zeta", "alpha", "mid"].into_iter().flat_map(move |b| {
                ["first", "second"]
                    .into_iter()
                    .map(move |r| format!("{b}/{r}@{step}"))
            })
        })
        .collect();
    assert_eq!(*log.lock().unwrap(), expected);

    let applied: Vec<(BodyHandle, f64)> = s
        .world()
        .applied()
        .iter()
        .map(|(h, o)| (*h, o.commands[0].value))
        .collect();
    let one_step = vec![
        (BodyHandle(0), 1.0),
        (BodyHandle(0), 2.0),
        (BodyHandle(1), 3.0),
        (BodyHandle(1), 4.0),
        (BodyHandle(2), 5.0),
        (BodyHandle(2), 6.0),
    ];
    assert_eq!(applied, one_step.repeat(3));
}
