use std::time::Duration;

use glam::DVec3;
use stepsim_common::LinkRef;
use stepsim_kernel::{
    BodySpec, CollisionPairSpec, ContactParams, ControllerSpec, DynamicsError, Project, SimulatorConfig,
    StepError,
};
use stepsim_reference::{
    ModelLibrary, ModelSpec, ReferenceFactory, ReferenceSimulator, RigidWorld, RigidWorldConfig,
    SphereCollision,
};

fn simulator(config: SimulatorConfig) -> ReferenceSimulator {
    ReferenceSimulator::new(RigidWorld::new(RigidWorldConfig::default()), SphereCollision, config)
}

fn z_of(sim: &ReferenceSimulator, body: &str) -> f64 {
    sim.state()
        .and_then(|s| s.body_by_name(body))
        .map(|b| b.links[0].transform.position.z)
        .unwrap()
}

#[test]
fn ball_lands_on_floor() {
    let mut project = Project::new("drop", 0.001)
        .with_body(BodySpec::new("floor", "floor"))
        .with_body(BodySpec::new("ball", "ball").at(DVec3::new(0.0, 0.0, 0.5)));
    project.collision_pairs.push(CollisionPairSpec {
        a: LinkRef::new("ball", "root"),
        b: LinkRef::new("floor", "surface"),
        contact: ContactParams {
            culling_threshold: 0.0,
            ..ContactParams::default()
        },
    });

    let mut sim = simulator(SimulatorConfig::default());
    sim.init(&project, &mut ReferenceFactory::new(ModelLibrary::builtin()), None)
        .unwrap();

    let mut touched = false;
    for _ in 0..1500 {
        let report = sim.step().unwrap();
        touched |= report.contacts > 0;
        assert!(z_of(&sim, "ball") > 0.05, "ball sank through the floor");
    }
    assert!(touched);
    assert!(z_of(&sim, "ball") < 0.5);
    assert_eq!(z_of(&sim, "floor"), -1000.0);
}

#[test]
fn hold_controller_settles_on_target() {
    let project = Project::new("hover", 0.01).with_body(
        BodySpec::new("drone", "ball")
            .at(DVec3::new(0.0, 0.0, 0.8))
            .with_controller(
                ControllerSpec::new("hold", "hold")
                    .with_param("z", 1.0)
                    .with_param("lift", 9.8),
            ),
    );
    let mut sim = simulator(SimulatorConfig::default());
    sim.init(&project, &mut ReferenceFactory::new(ModelLibrary::builtin()), None)
        .unwrap();
    for _ in 0..400 {
        assert!(sim.one_step());
    }
    assert!((z_of(&sim, "drone") - 1.0).abs() < 0.01);
}

#[test]
fn runaway_force_rolls_back() {
    let project = Project::new("runaway", 0.01).with_body(
        BodySpec::new("rocket", "ball").with_controller(
            ControllerSpec::new("boost", "constant")
                .with_param("actuator", 2.0)
                .with_param("value", 1.0e6),
        ),
    );
    let mut sim = simulator(SimulatorConfig::default());
    sim.init(&project, &mut ReferenceFactory::new(ModelLibrary::builtin()), None)
        .unwrap();
    let err = sim.step().unwrap_err();
    assert!(matches!(err, StepError::Dynamics(DynamicsError::Diverged(_))));
    assert_eq!(sim.time(), 0.0);
    assert_eq!(z_of(&sim, "rocket"), 0.0);
    assert_eq!(sim.diagnostics().rollback_failures, 0);
}

#[test]
fn stalled_threaded_controller_degrades_steps() {
    let config = SimulatorConfig::default().with_receiver_timeout(Duration::from_millis(20));
    let project = Project::new("stall", 0.01).with_body(
        BodySpec::new("bot", "ball")
            .with_controller(ControllerSpec::new("nap", "stall").with_param("delay_ms", 150.0)),
    );
    let mut sim = simulator(config);
    sim.init(&project, &mut ReferenceFactory::new(ModelLibrary::builtin()), None)
        .unwrap();
    for _ in 0..3 {
        assert!(sim.step().unwrap().degraded);
    }
    assert_eq!(sim.steps(), 3);
    assert_eq!(sim.diagnostics().receiver_timeouts, 3);
    sim.stop_simulation();
}

#[test]
fn only_overlapping_pair_collides() {
    let library = ModelLibrary::builtin().with_model("pellet", ModelSpec::sphere(0.05));
    let mut project = Project::new("quad", 0.001)
        .with_body(BodySpec::new("A", "pellet"))
        .with_body(BodySpec::new("B", "pellet").at(DVec3::new(0.09, 0.0, 0.0)))
        .with_body(BodySpec::new("C", "pellet").at(DVec3::new(5.0, 0.0, 0.0)))
        .with_body(BodySpec::new("D", "pellet").at(DVec3::new(6.0, 0.0, 0.0)))
        .with_pair(LinkRef::new("A", "root"), LinkRef::new("B", "root"))
        .with_pair(LinkRef::new("C", "root"), LinkRef::new("D", "root"));
    project.world.gravity = DVec3::ZERO;
    for pair in &mut project.collision_pairs {
        pair.contact.culling_threshold = 0.0;
    }

    let mut sim = simulator(SimulatorConfig::default());
    sim.init(&project, &mut ReferenceFactory::new(library), None).unwrap();
    let mut out = Vec::new();
    sim.check_collision(&mut out).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].pair, 0);
    assert!((out[0].points[0].depth - 0.01).abs() < 1e-12);

    // The overlapping pair is pushed apart; the far pair stays put.
    for _ in 0..50 {
        sim.step().unwrap();
    }
    let state = sim.state().unwrap();
    assert!(state.body_by_name("A").unwrap().links[0].linear_velocity.x < 0.0);
    assert!(state.body_by_name("B").unwrap().links[0].linear_velocity.x > 0.0);
    assert_eq!(state.body_by_name("C").unwrap().links[0].linear_velocity, DVec3::ZERO);
}
