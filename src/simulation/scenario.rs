//! Build fully-initialized simulation scenarios
//!
//! Takes a `SimConfig` (YAML-facing) plus either ingested records or a
//! generated disc, and produces a runtime bundle containing:
//! - engine settings (`Engine`)
//! - numerical parameters (`Parameters`)
//! - the galaxy at t = 0
//!
//! `Scenario::start` hands the bundle to a [`Simulator`].

use crate::configuration::config::SimConfig;
use crate::configuration::ingest::Ingested;
use crate::error::Result;
use crate::simulation::engine::{Engine, Simulator, StepObserver};
use crate::simulation::params::Parameters;
use crate::simulation::states::{Body, Galaxy, Rgb, Vector, WorldBounds};

#[derive(Debug, Clone)]
pub struct Scenario {
    pub engine: Engine,
    pub parameters: Parameters,
    pub galaxy: Galaxy,
}

impl Scenario {
    /// Scenario from configuration and ingested records. Parameter records
    /// in the input override the configuration.
    pub fn from_records(cfg: &SimConfig, input: Ingested) -> Self {
        let engine = cfg.engine();
        let mut parameters = cfg.parameters();
        input.apply(&mut parameters);
        let galaxy = input.into_galaxy(parameters.world_bounds());
        Self {
            engine,
            parameters,
            galaxy,
        }
    }

    /// Scenario with a generated disc of `n` bodies around a heavy core.
    pub fn disc(cfg: &SimConfig, n: usize) -> Self {
        let parameters = cfg.parameters();
        let galaxy = disc_galaxy(n, parameters.world_bounds(), parameters.g);
        Self {
            engine: cfg.engine(),
            parameters,
            galaxy,
        }
    }

    pub fn start(self) -> Result<Simulator> {
        Simulator::start(self.galaxy, self.engine, self.parameters)
    }

    pub fn start_observed(self, observer: impl StepObserver + 'static) -> Result<Simulator> {
        Simulator::start_observed(self.galaxy, self.engine, self.parameters, observer)
    }
}

/// A heavy core with `n` light bodies on roughly circular orbits.
///
/// Positions follow a deterministic spiral, no randomness, so runs and
/// benchmarks are reproducible.
pub fn disc_galaxy(n: usize, bounds: WorldBounds, g: f64) -> Galaxy {
    let mut galaxy = Galaxy::new(bounds);
    let core_mass = 1.0e7;
    galaxy.push(
        Body::new(core_mass, Vector::zeros(), Vector::zeros(), 60.0).with_color(Rgb(255, 220, 120)),
    );

    let r_max = (0.5 * bounds.half_extent).min(3000.0);
    for i in 0..n {
        let i_f = i as f64;
        let angle = i_f * 2.399_963; // golden angle
        let r = 200.0 + (r_max - 200.0) * ((i_f + 0.5) / n as f64).sqrt();
        let position = Vector::new(r * angle.cos(), r * angle.sin());
        let speed = (g * core_mass / r).sqrt();
        let velocity = Vector::new(-angle.sin(), angle.cos()) * speed;
        let size = 4.0 + (i % 5) as f64;
        galaxy.push(Body::new(size * size * size, position, velocity, size));
    }
    galaxy
}
