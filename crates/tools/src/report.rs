use std::fmt;
use std::time::Duration;
use stepsim_kernel::{PhaseTimings, TimingTracker};

/// Statistics for one timed phase.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseLine {
    pub phase: &'static str,
    pub count: u64,
    pub mean: Option<Duration>,
    pub max: Duration,
    pub total: Duration,
}

impl PhaseLine {
    fn new(phase: &'static str, tracker: &TimingTracker) -> Self {
        Self {
            phase,
            count: tracker.count(),
            mean: tracker.mean_duration(),
            max: tracker.max(),
            total: tracker.total(),
        }
    }
}

/// Per-phase timing table, printed at the end of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct TimingReport {
    pub lines: Vec<PhaseLine>,
}

impl TimingReport {
    pub fn new(timings: &PhaseTimings) -> Self {
        Self {
            lines: vec![
                PhaseLine::new("dynamics", &timings.dynamics),
                PhaseLine::new("control", &timings.control),
                PhaseLine::new("collision", &timings.collision),
            ],
        }
    }

    pub fn line(&self, phase: &str) -> Option<&PhaseLine> {
        self.lines.iter().find(|l| l.phase == phase)
    }
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

impl fmt::Display for TimingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<10} {:>8} {:>12} {:>12} {:>12}",
            "phase", "count", "mean[ms]", "max[ms]", "total[ms]"
        )?;
        for line in &self.lines {
            let mean = match line.mean {
                Some(m) => format!("{:.4}", ms(m)),
                None => "-".to_string(),
            };
            writeln!(
                f,
                "{:<10} {:>8} {:>12} {:>12.4} {:>12.4}",
                line.phase,
                line.count,
                mean,
                ms(line.max),
                ms(line.total)
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_timings_show_no_mean() {
        let report = TimingReport::new(&PhaseTimings::default());
        assert_eq!(report.lines.len(), 3);
        assert!(report.lines.iter().all(|l| l.mean.is_none()));
        let text = report.to_string();
        assert!(text.contains("dynamics"));
        assert!(text.lines().nth(1).unwrap().contains(" -"));
    }

    #[test]
    fn report_reflects_recorded_durations() {
        let mut timings = PhaseTimings::default();
        timings.control.record(Duration::from_millis(2));
        timings.control.record(Duration::from_millis(4));
        let report = TimingReport::new(&timings);
        let control = report.line("control").unwrap();
        assert_eq!(control.count, 2);
        assert_eq!(control.mean, Some(Duration::from_millis(3)));
        assert_eq!(control.max, Duration::from_millis(4));
        assert!(report.to_string().contains("3.0000"));
    }
}
