//! Shared types used across the stepsim crates.
//!
//! # Invariants
//! - Spatial values are double precision; the dynamics side never rounds to f32.

mod types;

pub use glam::{DQuat, DVec3};
pub use types::{BodyHandle, LinkId, LinkRef, Transform};
