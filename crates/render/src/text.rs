use std::fmt::Write as _;
use std::io::Write;

use stepsim_kernel::{SceneError, SceneSink, WorldState};

/// What to include when rendering a state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderView {
    /// Decimal places for positions and velocities.
    pub precision: usize,
    pub show_velocity: bool,
    /// Print every link rather than only each body's first link.
    pub all_links: bool,
}

impl Default for RenderView {
    fn default() -> Self {
        Self {
            precision: 3,
            show_velocity: false,
            all_links: false,
        }
    }
}

/// Renderer-agnostic interface over committed world states.
pub trait Renderer {
    type Output;

    fn render(&self, state: &WorldState, view: &RenderView) -> Self::Output;
}

/// Plain-text rendering, one line per body (or link).
#[derive(Debug, Default)]
pub struct DebugTextRenderer;

impl DebugTextRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl Renderer for DebugTextRenderer {
    type Output = String;

    fn render(&self, state: &WorldState, view: &RenderView) -> String {
        let prec = view.precision;
        let mut out = String::new();
        let _ = writeln!(
            out,
            "=== step {} t={:.prec$} bodies={} ===",
            state.step,
            state.time,
            state.bodies.len()
        );
        for body in &state.bodies {
            let links = if view.all_links {
                &body.links[..]
            } else {
                &body.links[..body.links.len().min(1)]
            };
            for link in links {
                let p = link.transform.position;
                let _ = write!(
                    out,
                    "  {}:{} pos=({:.prec$}, {:.prec$}, {:.prec$})",
                    body.name, link.name, p.x, p.y, p.z
                );
                if view.show_velocity {
                    let v = link.linear_velocity;
                    let _ = write!(out, " vel=({:.prec$}, {:.prec$}, {:.prec$})", v.x, v.y, v.z);
                }
                out.push('\n');
            }
        }
        out
    }
}

/// Scene sink that writes a text rendering of every `every`-th state.
pub struct DebugTextScene<W> {
    out: W,
    view: RenderView,
    every: u64,
    renderer: DebugTextRenderer,
}

impl<W: Write> DebugTextScene<W> {
    pub fn new(out: W, view: RenderView) -> Self {
        Self {
            out,
            view,
            every: 1,
            renderer: DebugTextRenderer,
        }
    }

    /// Render only states whose step index is a multiple of `every`.
    pub fn every(mut self, every: u64) -> Self {
        self.every = every.max(1);
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> SceneSink for DebugTextScene<W> {
    fn publish(&mut self, state: &WorldState) -> Result<(), SceneError> {
        if state.step % self.every != 0 {
            return Ok(());
        }
        let text = self.renderer.render(state, &self.view);
        self.out
            .write_all(text.as_bytes())
            .and_then(|()| self.out.flush())
            .map_err(|e| SceneError::Failed(e.to_string()))
    }
}
