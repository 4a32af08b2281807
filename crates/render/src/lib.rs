//! Scene presentation: turns committed world states into something a person
//! can look at.
//!
//! # Invariants
//! - Renderers only read world state; they never feed back into a step.
//! - A sink failure is reported to the simulator, which logs it and moves on.

mod text;

pub use text::{DebugTextRenderer, DebugTextScene, RenderView, Renderer};
