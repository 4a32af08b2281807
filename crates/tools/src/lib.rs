//! Developer tooling: read-only views of a running simulator and of recorded
//! state logs.
//!
//! # Invariants
//! - Inspection never mutates the simulator.

mod inspector;
mod report;

pub use inspector::{BodyInfo, LogSummary, ReceiverInfo, SimulatorInspector, SimulatorSummary};
pub use report::{PhaseLine, TimingReport};
