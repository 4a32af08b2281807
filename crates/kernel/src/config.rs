use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Runtime policy for the stepping loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Upper bound on a single clock-receiver tick, in milliseconds.
    pub receiver_timeout_ms: u64,
    /// Treat a controller timeout or failure as a step failure instead of
    /// holding the previous control value.
    pub strict_controllers: bool,
    /// Reject captured states containing NaN or infinite values.
    pub check_finite_state: bool,
}

impl SimulatorConfig {
    pub fn receiver_timeout(&self) -> Duration {
        Duration::from_millis(self.receiver_timeout_ms)
    }

    pub fn strict(mut self) -> Self {
        self.strict_controllers = true;
        self
    }

    pub fn with_receiver_timeout(mut self, timeout: Duration) -> Self {
        self.receiver_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            receiver_timeout_ms: 100,
            strict_controllers: false,
            check_finite_state: true,
        }
    }
}
