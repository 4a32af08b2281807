use glam::DVec3;
use std::fmt;
use stepsim_common::BodyHandle;
use stepsim_kernel::{CollisionEngine, DynamicsWorld, Simulator, StepDiagnostics};
use stepsim_log::StateLog;

/// Read-only queries against a simulator for debugging and reports.
pub struct SimulatorInspector;

impl SimulatorInspector {
    pub fn summary<W, C>(sim: &Simulator<W, C>) -> SimulatorSummary
    where
        W: DynamicsWorld,
        C: CollisionEngine<W>,
    {
        SimulatorSummary {
            project: sim.project_name().map(str::to_string),
            steps: sim.steps(),
            time: sim.time(),
            bodies: sim.bodies().len(),
            receivers: sim.bodies().iter().map(|b| b.receivers().len()).sum(),
            pairs: sim.pair_count(),
            diagnostics: sim.diagnostics().clone(),
        }
    }

    /// Position, velocity and controller health of one body, by name.
    pub fn inspect_body<W, C>(sim: &Simulator<W, C>, name: &str) -> Option<BodyInfo>
    where
        W: DynamicsWorld,
        C: CollisionEngine<W>,
    {
        let body = sim.bodies().iter().find(|b| b.name() == name)?;
        let root = sim
            .state()
            .and_then(|s| s.body(body.handle()))
            .and_then(|b| b.links.first());
        Some(BodyInfo {
            name: body.name().to_string(),
            handle: body.handle(),
            position: root.map(|l| l.transform.position),
            velocity: root.map(|l| l.linear_velocity),
            receivers: body
                .receivers()
                .iter()
                .map(|slot| ReceiverInfo {
                    name: slot.name().to_string(),
                    timeouts: slot.timeouts(),
                    failures: slot.failures(),
                    holding: slot.held().is_some(),
                })
                .collect(),
        })
    }

    pub fn list_bodies<W, C>(sim: &Simulator<W, C>) -> Vec<String>
    where
        W: DynamicsWorld,
        C: CollisionEngine<W>,
    {
        sim.bodies().iter().map(|b| b.name().to_string()).collect()
    }

    pub fn summarize_log(log: &StateLog) -> LogSummary {
        let mut peak_speed: Option<(f64, String)> = None;
        for state in log.states() {
            for body in &state.bodies {
                for link in &body.links {
                    let speed = link.linear_velocity.length();
                    if peak_speed.as_ref().is_none_or(|(best, _)| speed > *best) {
                        peak_speed = Some((speed, body.name.clone()));
                    }
                }
            }
        }
        LogSummary {
            project: log.project.clone(),
            states: log.len(),
            first_time: log.first().map(|s| s.time),
            last_time: log.last().map(|s| s.time),
            bodies: log
                .last()
                .map(|s| s.bodies.iter().map(|b| b.name.clone()).collect())
                .unwrap_or_default(),
            peak_speed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatorSummary {
    pub project: Option<String>,
    pub steps: u64,
    pub time: f64,
    pub bodies: usize,
    pub receivers: usize,
    pub pairs: usize,
    pub diagnostics: StepDiagnostics,
}

impl fmt::Display for SimulatorSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.diagnostics;
        write!(
            f,
            "Simulator: project={} steps={} time={:.4} bodies={} receivers={} pairs={}\n\
             Steps: completed={} failed={} degraded={} | receiver timeouts={} failures={} | \
             scene failures={} rollback failures={}",
            self.project.as_deref().unwrap_or("<none>"),
            self.steps,
            self.time,
            self.bodies,
            self.receivers,
            self.pairs,
            d.steps_completed,
            d.steps_failed,
            d.steps_degraded,
            d.receiver_timeouts,
            d.receiver_failures,
            d.scene_failures,
            d.rollback_failures,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReceiverInfo {
    pub name: String,
    pub timeouts: u64,
    pub failures: u64,
    /// Whether the receiver has an output in force.
    pub holding: bool,
}

#[derive(Debug, Clone)]
pub struct BodyInfo {
    pub name: String,
    pub handle: BodyHandle,
    pub position: Option<DVec3>,
    pub velocity: Option<DVec3>,
    pub receivers: Vec<ReceiverInfo>,
}

impl fmt::Display for BodyInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Body {} ({})", self.name, self.handle)?;
        if let Some(p) = self.position {
            write!(f, " pos=({:.3}, {:.3}, {:.3})", p.x, p.y, p.z)?;
        }
        if let Some(v) = self.velocity {
            write!(f, " vel=({:.3}, {:.3}, {:.3})", v.x, v.y, v.z)?;
        }
        for r in &self.receivers {
            write!(
                f,
                "\n  receiver {}: timeouts={} failures={}{}",
                r.name,
                r.timeouts,
                r.failures,
                if r.holding { "" } else { " (no output yet)" }
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogSummary {
    pub project: String,
    pub states: usize,
    pub first_time: Option<f64>,
    pub last_time: Option<f64>,
    /// Bodies present in the last recorded state.
    pub bodies: Vec<String>,
    /// Highest link speed seen and the body it belongs to.
    pub peak_speed: Option<(f64, String)>,
}

impl fmt::Display for LogSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Log: project={} states={}", self.project, self.states)?;
        if let (Some(first), Some(last)) = (self.first_time, self.last_time) {
            write!(f, " time={first:.4}..{last:.4}")?;
        }
        write!(f, "\nBodies: {}", self.bodies.join(", "))?;
        if let Some((speed, body)) = &self.peak_speed {
            write!(f, "\nPeak speed: {speed:.3} m/s ({body})")?;
        }
        Ok(())
    }
}
