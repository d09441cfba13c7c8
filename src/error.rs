//! Simulation error types.
//!
//! Only two conditions are fatal to a running simulation: the spatial tree's
//! node pool outgrowing its ceiling, and a body leaving the world under
//! [`BoundsPolicy::Diverge`](crate::simulation::states::BoundsPolicy).
//! Everything else (ignored pause requests, skipped input records) is handled
//! locally and never shows up here.

use thiserror::Error;

use crate::simulation::states::Vector;

#[derive(Debug, Error)]
pub enum SimError {
    /// The tree needed more nodes than `node_pool_ceiling` allows.
    /// Usually too many bodies or a degenerate cluster for the configured limits.
    #[error("spatial tree node pool exhausted (ceiling {ceiling} nodes)")]
    NodePoolExhausted { ceiling: usize },

    /// A body left the world bounds and the policy is to stop rather than clamp.
    #[error("simulation diverged: body {body} left the world at ({}, {})", .position.x, .position.y)]
    Diverged { body: usize, position: Vector },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("worker {worker} panicked")]
    WorkerPanicked { worker: usize },

    #[error("simulation thread panicked")]
    SimulationPanicked,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;
