use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use stepsim_kernel::{SceneError, SceneSink, WorldState};

/// In-memory recording of world states in step order.
///
/// With a capacity set, the oldest states are dropped once it is reached.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateLog {
    pub project: String,
    pub time_step: f64,
    capacity: Option<usize>,
    states: VecDeque<WorldState>,
    dropped: u64,
}

impl StateLog {
    pub fn new(project: impl Into<String>, time_step: f64) -> Self {
        Self {
            project: project.into(),
            time_step,
            ..Self::default()
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity.max(1));
        self
    }

    pub(crate) fn from_parts(project: String, time_step: f64, states: Vec<WorldState>) -> Self {
        Self {
            project,
            time_step,
            capacity: None,
            states: states.into(),
            dropped: 0,
        }
    }

    pub fn push(&mut self, state: WorldState) {
        if let Some(capacity) = self.capacity {
            while self.states.len() >= capacity {
                self.states.pop_front();
                self.dropped += 1;
            }
        }
        self.states.push_back(state);
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// States evicted because of the capacity limit.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn states(&self) -> impl Iterator<Item = &WorldState> {
        self.states.iter()
    }

    pub fn first(&self) -> Option<&WorldState> {
        self.states.front()
    }

    pub fn last(&self) -> Option<&WorldState> {
        self.states.back()
    }

    /// Latest recorded state at or before `time`, for playback seeking.
    pub fn at_time(&self, time: f64) -> Option<&WorldState> {
        let idx = self.states.partition_point(|s| s.time <= time);
        idx.checked_sub(1).and_then(|i| self.states.get(i))
    }

    pub fn clear(&mut self) {
        self.states.clear();
        self.dropped = 0;
    }
}

/// Shared access to a [`StateLog`] that a [`LogSink`] is filling.
#[derive(Debug, Clone)]
pub struct LogHandle(Arc<Mutex<StateLog>>);

impl LogHandle {
    fn lock(&self) -> MutexGuard<'_, StateLog> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Run `f` against the log while holding the lock.
    pub fn with<R>(&self, f: impl FnOnce(&StateLog) -> R) -> R {
        f(&self.lock())
    }

    /// A copy of the log as it stands.
    pub fn snapshot(&self) -> StateLog {
        self.lock().clone()
    }
}

/// Scene sink that appends each committed state to a shared log.
pub struct LogSink {
    log: LogHandle,
}

impl LogSink {
    pub fn new(log: StateLog) -> Self {
        Self {
            log: LogHandle(Arc::new(Mutex::new(log))),
        }
    }

    pub fn handle(&self) -> LogHandle {
        self.log.clone()
    }
}

impl SceneSink for LogSink {
    fn publish(&mut self, state: &WorldState) -> Result<(), SceneError> {
        let mut log = self
            .log
            .0
            .lock()
            .map_err(|_| SceneError::Failed("state log lock poisoned".into()))?;
        log.push(state.clone());
        Ok(())
    }
}
