//! Numerical and physical parameters for the simulation
//!
//! `Parameters` holds the per-run constants:
//! - step size `dt`,
//! - gravitational constant `g` and softening `eps` (added to distance²),
//! - opening angle `theta` for the Barnes–Hut approximation,
//! - world half-extent and the bounds policy
//!
//! `TreeLimits` sizes the spatial tree's node pool and bounds its depth.
//!
//! `eps` defaults to 500 distance² units, which is large next to typical body
//! sizes. It keeps close passes from slingshotting bodies out of the galaxy;
//! it does not try to model softened gravity faithfully.

use crate::simulation::states::{BoundsPolicy, WorldBounds};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Parameters {
    pub dt: f64,    // time step
    pub g: f64,     // gravitational constant
    pub eps: f64,   // softening added to distance²
    pub theta: f64, // opening angle, 0 = exact summation
    pub world_extent: f64,
    pub bounds: BoundsPolicy,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            dt: 0.2,
            g: 1.0,
            eps: 500.0,
            theta: 1.0,
            world_extent: 1.0e5,
            bounds: BoundsPolicy::Clamp,
        }
    }
}

impl Parameters {
    pub fn world_bounds(&self) -> WorldBounds {
        WorldBounds::new(self.world_extent, self.bounds)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeLimits {
    pub initial_nodes: usize,
    pub max_nodes: usize, // growing past this is fatal
    pub max_depth: usize, // deeper insertions are chained into the leaf
}

impl Default for TreeLimits {
    fn default() -> Self {
        Self {
            initial_nodes: 1024,
            max_nodes: 1 << 20,
            max_depth: 48,
        }
    }
}
