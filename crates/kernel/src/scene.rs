use crate::state::WorldState;

/// Errors from a scene observer. Never fatal to the step that triggered them.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("scene sink closed")]
    Closed,
    #[error("scene sink failed: {0}")]
    Failed(String),
}

/// Observer notified with every committed world state.
///
/// Sinks only read; world truth stays with the simulator.
pub trait SceneSink {
    fn publish(&mut self, state: &WorldState) -> Result<(), SceneError>;
}

/// Forwards each state to several sinks in order.
///
/// Every sink is notified even if an earlier one fails; the first error is
/// returned.
#[derive(Default)]
pub struct SceneFanout {
    sinks: Vec<Box<dyn SceneSink>>,
}

impl SceneFanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Box<dyn SceneSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl SceneSink for SceneFanout {
    fn publish(&mut self, state: &WorldState) -> Result<(), SceneError> {
        let mut first_error = None;
        for sink in &mut self.sinks {
            if let Err(e) = sink.publish(state) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
