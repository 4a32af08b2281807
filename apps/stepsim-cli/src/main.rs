mod scenario;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use stepsim_kernel::{SceneFanout, SceneSink, StepError};
use stepsim_log::{LogSink, StateLog};
use stepsim_reference::{
    CONTROLLER_KINDS, ModelLibrary, ReferenceFactory, ReferenceSimulator, RigidWorld, SphereCollision,
};
use stepsim_render::{DebugTextScene, RenderView};
use stepsim_tools::{SimulatorInspector, TimingReport};
use tracing_subscriber::EnvFilter;

use crate::scenario::Scenario;

#[derive(Parser)]
#[command(name = "stepsim", about = "Fixed-step multibody simulation runner")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version, built-in models and controller kinds
    Info,
    /// Run a scenario file to completion
    Run {
        /// Scenario file (.yaml or .json)
        scenario: PathBuf,
        /// Stop after this many steps instead of at the project's total time
        #[arg(short, long)]
        steps: Option<u64>,
        /// Fail the step when a controller misses its deadline
        #[arg(long)]
        strict: bool,
        /// Override the controller deadline in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Run every controller on its own thread
        #[arg(long)]
        threaded: bool,
        /// Print the state every N steps (0 disables)
        #[arg(short, long, default_value = "0")]
        print_every: u64,
        /// Record committed states and save them to this file
        #[arg(short, long)]
        log: Option<PathBuf>,
    },
    /// Summarize a saved state log
    InspectLog {
        file: PathBuf,
        /// Print the state recorded at or before this time
        #[arg(long)]
        at: Option<f64>,
    },
}

struct RunOptions {
    steps: Option<u64>,
    strict: bool,
    timeout_ms: Option<u64>,
    threaded: bool,
    print_every: u64,
    log: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("stepsim v{}", env!("CARGO_PKG_VERSION"));
            let library = ModelLibrary::builtin();
            println!("models: {}", library.names().collect::<Vec<_>>().join(", "));
            println!("controllers: {}", CONTROLLER_KINDS.join(", "));
        }
        Commands::Run {
            scenario,
            steps,
            strict,
            timeout_ms,
            threaded,
            print_every,
            log,
        } => {
            let scenario = Scenario::load(&scenario)?;
            run(
                scenario,
                RunOptions {
                    steps,
                    strict,
                    timeout_ms,
                    threaded,
                    print_every,
                    log,
                },
            )?;
        }
        Commands::InspectLog { file, at } => {
            let log = stepsim_log::load(&file)
                .with_context(|| format!("loading state log {}", file.display()))?;
            println!("{}", SimulatorInspector::summarize_log(&log));
            if let Some(time) = at {
                let Some(state) = log.at_time(time) else {
                    bail!("no state recorded at or before t={time}");
                };
                let view = RenderView {
                    show_velocity: true,
                    all_links: true,
                    ..RenderView::default()
                };
                let mut scene = DebugTextScene::new(io::stdout(), view);
                scene.publish(state)?;
            }
        }
    }

    Ok(())
}

fn run(scenario: Scenario, opts: RunOptions) -> anyhow::Result<()> {
    let max_steps = match (opts.steps, scenario.project.total_time) {
        (Some(steps), _) => steps,
        (None, Some(_)) => u64::MAX,
        (None, None) => bail!("project has no total_time; pass --steps"),
    };

    let mut config = scenario.simulator.clone();
    if let Some(ms) = opts.timeout_ms {
        config = config.with_receiver_timeout(Duration::from_millis(ms));
    }
    if opts.strict {
        config = config.strict();
    }

    let mut factory = ReferenceFactory::new(scenario.library()?).with_threaded_controllers(opts.threaded);
    let mut sim = ReferenceSimulator::new(RigidWorld::new(scenario.engine), SphereCollision::new(), config);

    let mut scene = SceneFanout::new();
    if opts.print_every > 0 {
        scene = scene.with(Box::new(
            DebugTextScene::new(io::stdout(), RenderView::default()).every(opts.print_every),
        ));
    }
    let mut log_handle = None;
    if opts.log.is_some() {
        let sink = LogSink::new(StateLog::new(
            scenario.project.name.clone(),
            scenario.project.time_step,
        ));
        log_handle = Some(sink.handle());
        scene = scene.with(Box::new(sink));
    }
    let scene = (!scene.is_empty()).then(|| Box::new(scene) as Box<dyn SceneSink>);

    sim.init(&scenario.project, &mut factory, scene)
        .with_context(|| format!("initializing project '{}'", scenario.project.name))?;

    let mut failure = None;
    while sim.steps() < max_steps {
        match sim.step() {
            Ok(_) => {}
            Err(StepError::SessionComplete { .. }) => break,
            Err(err) => {
                tracing::warn!(step = sim.steps() + 1, error = %err, "run aborted");
                failure = Some(err);
                break;
            }
        }
    }

    println!("{}", SimulatorInspector::summary(&sim));
    print!("{}", TimingReport::new(sim.timings()));
    sim.stop_simulation();

    if let (Some(path), Some(handle)) = (&opts.log, &log_handle) {
        let header = stepsim_log::save(&handle.snapshot(), path)
            .with_context(|| format!("saving state log {}", path.display()))?;
        println!("saved {} states to {}", header.state_count, path.display());
    }

    if let Some(err) = failure {
        return Err(err).context("simulation stopped");
    }
    Ok(())
}
