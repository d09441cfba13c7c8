use galaxysim::{bench_gravity, bench_gravity_curve, bench_workers};
use galaxysim::{ingest_reader, Galaxy, RunState, Scenario, SimConfig};

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};

use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

// pause requester id for the periodic inspection
const INSPECT: u32 = 0;

#[derive(Parser, Debug)]
struct Args {
    /// Simulator settings (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Initial bodies as a YAML record stream, "-" for stdin
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Bodies in the generated disc when no input is given
    #[arg(short = 'n', long, default_value_t = 500)]
    bodies: usize,

    /// Steps to run before stopping
    #[arg(long, default_value_t = 200)]
    steps: u64,

    /// Pause and inspect the galaxy every this many steps
    #[arg(long, default_value_t = 50)]
    report_every: u64,

    /// Run the timing benchmarks instead of a simulation
    #[arg(long)]
    bench: bool,
}

// load here to keep main clean
fn load_scenario(args: &Args) -> Result<Scenario> {
    let cfg = match &args.config {
        Some(path) => SimConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => SimConfig::default(),
    };

    let scenario = match &args.input {
        Some(path) if path.as_os_str() == "-" => {
            Scenario::from_records(&cfg, ingest_reader(io::stdin().lock())?)
        }
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            Scenario::from_records(&cfg, ingest_reader(BufReader::new(file))?)
        }
        None => Scenario::disc(&cfg, args.bodies),
    };
    Ok(scenario)
}

fn report(step: u64, g: &Galaxy) {
    let c = g.center();
    let ke: f64 = g.bodies.iter().map(|b| 0.5 * b.mass * b.velocity.norm_squared()).sum();
    info!(
        "step {step}: t = {:.3}, bodies = {}, centroid = ({:.2}, {:.2}), kinetic energy = {:.4e}",
        g.t,
        g.bodies.len(),
        c.x,
        c.y,
        ke
    );
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.bench {
        bench_gravity();
        bench_workers(args.bodies, 10);
        bench_gravity_curve();
        return Ok(());
    }

    let scenario = load_scenario(&args)?;
    info!("loaded {} bodies", scenario.galaxy.bodies.len());
    let sim = scenario.start_observed(|step: u64, g: &Galaxy| {
        debug!("step {step} done, t = {:.3}", g.t)
    })?;

    let every = args.report_every.max(1);
    let mut next_report = every;
    while sim.steps() < args.steps && sim.state() != RunState::Stopped {
        if sim.steps() >= next_report {
            let guard = sim.pause_guard(INSPECT);
            if guard.acquired() {
                sim.with_galaxy(|g| report(sim.steps(), g));
            }
            next_report += every;
        }
        thread::sleep(Duration::from_millis(5));
    }

    sim.stop().context("simulation failed")?;
    report(sim.steps(), &sim.snapshot());
    Ok(())
}
