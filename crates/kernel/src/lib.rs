//! Stepping kernel: advances a dynamics world in fixed increments while keeping
//! controllers, collision detection and the published world state consistent.
//!
//! # Invariants
//! - One step runs control → collision → dynamics → commit, in that order.
//! - Controllers always see the state committed by the previous step.
//! - Contacts fed to the dynamics advance are computed on pre-advance geometry.
//! - A failed step commits nothing: world state and simulation time are unchanged.
//! - The collidable link-pair set is fixed between `init` and `stop_simulation`.

pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod factory;
pub mod pairs;
pub mod project;
pub mod scene;
pub mod simulator;
pub mod state;
pub mod timing;

pub use config::SimulatorConfig;
pub use control::{
    ActuatorCommand, ClockReceiver, ControlOutput, ControlledBody, Controller, LocalReceiver,
    ReceiverError, ThreadedReceiver, TickContext,
};
pub use engine::{Collision, CollisionEngine, CollisionError, ContactPoint, DynamicsError, DynamicsWorld};
pub use error::{InitError, StepError};
pub use factory::{BodyFactory, BuiltBody, FactoryError};
pub use pairs::{LinkPair, PairRegistry};
pub use project::{BodySpec, CollisionPairSpec, ContactParams, ControllerSpec, Integrator, Project, WorldSettings};
pub use scene::{SceneError, SceneFanout, SceneSink};
pub use simulator::{Simulator, StepDiagnostics, StepReport};
pub use state::{BodyState, LinkState, WorldState};
pub use timing::{PhaseTimings, TimingTracker};
