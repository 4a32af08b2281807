use std::time::Duration;

use crate::engine::{CollisionError, DynamicsError};
use crate::factory::FactoryError;

/// Errors from [`Simulator::init`](crate::Simulator::init).
///
/// After any of these the simulator is back in its pre-init state.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("invalid time step {0}: must be positive and finite")]
    InvalidTimeStep(f64),
    #[error("invalid total time {0}: must be non-negative and finite")]
    InvalidTotalTime(f64),
    #[error("body name '{0}' used twice")]
    DuplicateBody(String),
    #[error("cannot build body '{body}': {source}")]
    Factory {
        body: String,
        #[source]
        source: FactoryError,
    },
    #[error("collision pair {pair} names unknown body '{body}'")]
    UnknownBody { pair: String, body: String },
    #[error("collision pair {pair} names unknown link '{link}' on body '{body}'")]
    UnknownLink {
        pair: String,
        body: String,
        link: String,
    },
    #[error("collision pair {0} registered twice")]
    DuplicatePair(String),
    #[error("collision pair {0} pairs a link with itself")]
    SelfPair(String),
    #[error("dynamics world rejected the project: {0}")]
    Dynamics(#[from] DynamicsError),
    #[error("collision engine rejected pair {pair}: {source}")]
    Collision {
        pair: String,
        #[source]
        source: CollisionError,
    },
}

/// Reasons a step did not commit.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("simulator is not initialized")]
    NotInitialized,
    #[error("session complete at t={time}")]
    SessionComplete { time: f64 },
    #[error("controller '{receiver}' on body '{body}' timed out after {timeout:?}")]
    ControllerTimeout {
        body: String,
        receiver: String,
        timeout: Duration,
    },
    #[error("controller '{receiver}' on body '{body}' failed: {reason}")]
    ControllerFailed {
        body: String,
        receiver: String,
        reason: String,
    },
    #[error("dynamics failure: {0}")]
    Dynamics(#[from] DynamicsError),
    #[error("collision failure: {0}")]
    Collision(#[from] CollisionError),
}
