//! Configuration types for loading simulator settings from YAML.
//!
//! A thin, `serde`-deserializable representation of the run settings:
//!
//! - [`EngineConfig`]     – worker count and Barnes–Hut tree options
//! - [`ParametersConfig`] – time step, physical constants and world bounds
//! - [`SimConfig`]        – top-level wrapper loaded from a YAML file
//!
//! Every field has a default, so a file only needs the keys it changes.
//!
//! # YAML format
//!
//! ```yaml
//! engine:
//!   workers: 3                 # threads besides the simulation thread
//!   theta: 1.0                 # opening angle, 0 = exact summation
//!   max_depth: 48              # deeper insertions share a leaf
//!   node_pool_initial: 1024
//!   node_pool_ceiling: 1048576 # growing past this is fatal
//!
//! parameters:
//!   dt: 0.2
//!   G: 1.0
//!   eps: 500.0                 # softening added to distance²
//!   world_extent: 100000.0     # half side of the square world
//!   bounds: clamp              # or "diverge"
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Result, SimError};
use crate::simulation::engine::Engine;
use crate::simulation::params::{Parameters, TreeLimits};
use crate::simulation::states::BoundsPolicy;

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub workers: usize,
    pub theta: f64,
    pub max_depth: usize,
    pub node_pool_initial: usize,
    pub node_pool_ceiling: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let engine = Engine::default();
        Self {
            workers: engine.workers,
            theta: Parameters::default().theta,
            max_depth: engine.tree.max_depth,
            node_pool_initial: engine.tree.initial_nodes,
            node_pool_ceiling: engine.tree.max_nodes,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ParametersConfig {
    pub dt: f64,
    #[serde(rename = "G")]
    pub g: f64,
    pub eps: f64,
    pub world_extent: f64,
    pub bounds: BoundsPolicy,
}

impl Default for ParametersConfig {
    fn default() -> Self {
        let p = Parameters::default();
        Self {
            dt: p.dt,
            g: p.g,
            eps: p.eps,
            world_extent: p.world_extent,
            bounds: p.bounds,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct SimConfig {
    pub engine: EngineConfig,
    pub parameters: ParametersConfig,
}

impl SimConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let cfg: SimConfig = serde_yaml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let cfg: SimConfig = serde_yaml::from_reader(reader)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let e = &self.engine;
        let p = &self.parameters;
        let fail = |msg: &str| Err(SimError::Config(msg.to_string()));

        if !(p.dt > 0.0) {
            return fail("dt must be positive");
        }
        if !(p.world_extent > 0.0) {
            return fail("world_extent must be positive");
        }
        if !(p.eps >= 0.0) {
            return fail("eps must not be negative");
        }
        if !(e.theta >= 0.0) {
            return fail("theta must not be negative");
        }
        if e.node_pool_initial == 0 {
            return fail("node_pool_initial must be at least 1");
        }
        if e.node_pool_ceiling < e.node_pool_initial {
            return fail("node_pool_ceiling must not be below node_pool_initial");
        }
        if e.max_depth == 0 {
            return fail("max_depth must be at least 1");
        }
        Ok(())
    }

    /// Runtime engine settings
    pub fn engine(&self) -> Engine {
        Engine {
            workers: self.engine.workers,
            tree: TreeLimits {
                initial_nodes: self.engine.node_pool_initial,
                max_nodes: self.engine.node_pool_ceiling,
                max_depth: self.engine.max_depth,
            },
        }
    }

    /// Runtime parameters
    pub fn parameters(&self) -> Parameters {
        Parameters {
            dt: self.parameters.dt,
            g: self.parameters.g,
            eps: self.parameters.eps,
            theta: self.engine.theta,
            world_extent: self.parameters.world_extent,
            bounds: self.parameters.bounds,
        }
    }
}
