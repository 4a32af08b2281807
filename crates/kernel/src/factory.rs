use crate::control::ClockReceiver;
use crate::project::BodySpec;

/// Errors from turning a [`BodySpec`] into an engine body.
#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    #[error("unknown model '{0}'")]
    UnknownModel(String),
    #[error("unknown controller kind '{kind}' for controller '{name}'")]
    UnknownController { name: String, kind: String },
    #[error("invalid parameter '{param}': {reason}")]
    InvalidParameter { param: String, reason: String },
    #[error("controller '{name}' could not be started: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// A constructed body plus the clock receivers that drive it.
pub struct BuiltBody<B> {
    pub body: B,
    pub receivers: Vec<Box<dyn ClockReceiver>>,
}

/// Turns project body descriptions into engine bodies of type `B`.
pub trait BodyFactory<B> {
    fn build(&mut self, spec: &BodySpec) -> Result<BuiltBody<B>, FactoryError>;
}
