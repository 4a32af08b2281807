use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Running wall-clock total for one step phase. Diagnostics only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingTracker {
    total: Duration,
    count: u64,
    max: Duration,
}

impl TimingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, dt: Duration) {
        self.total = self.total.saturating_add(dt);
        self.count += 1;
        self.max = self.max.max(dt);
    }

    /// Mean recorded duration, or `None` before the first record.
    pub fn mean_duration(&self) -> Option<Duration> {
        if self.count == 0 {
            return None;
        }
        let nanos = self.total.as_nanos() / u128::from(self.count);
        Some(Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX)))
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// The three per-phase trackers kept by the simulator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseTimings {
    pub dynamics: TimingTracker,
    pub control: TimingTracker,
    pub collision: TimingTracker,
}

impl PhaseTimings {
    pub fn reset(&mut self) {
        self.dynamics.reset();
        self.control.reset();
        self.collision.reset();
    }
}
