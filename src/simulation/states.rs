//! Core state types for the galaxy simulation.
//!
//! - `Vector` is a 2D nalgebra vector
//! - `Body` is a point mass with the two acceleration slots the leapfrog step needs
//! - `Galaxy` owns the ordered body list, the simulated time, and the world bounds

use nalgebra::Vector2;

pub type Vector = Vector2<f64>;

/// Display color of a body. Carried through the simulation untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Default for Rgb {
    fn default() -> Self {
        Rgb(0xff, 0xff, 0xff)
    }
}

#[derive(Debug, Clone)]
pub struct Body {
    pub mass: f64,
    pub position: Vector,
    pub velocity: Vector,
    pub acceleration: Vector,      // a_n, used to advance the position
    pub next_acceleration: Vector, // a_n+1, written by exactly one thread per step
    pub size: f64,                 // radius, only used for drawing/approximation geometry
    pub color: Rgb,
}

impl Body {
    pub fn new(mass: f64, position: Vector, velocity: Vector, size: f64) -> Self {
        Self {
            mass,
            position,
            velocity,
            acceleration: Vector::zeros(),
            next_acceleration: Vector::zeros(),
            size,
            color: Rgb::default(),
        }
    }

    /// A body sized for a view at `scale` world units per pixel:
    /// radius of two pixels, mass growing with volume.
    pub fn with_scale(scale: f64, position: Vector) -> Self {
        let size = 2.0 * scale;
        Self::new(size * size * size, position, Vector::zeros(), size)
    }

    pub fn with_color(mut self, color: Rgb) -> Self {
        self.color = color;
        self
    }
}

/// What to do with a body that ends a step outside the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundsPolicy {
    /// Pull the body back onto the boundary and drop its outward velocity.
    #[default]
    Clamp,
    /// Leave the body where it is and stop the simulation as diverged.
    Diverge,
}

/// Result of checking one body against the world bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundsCheck {
    Inside,
    Clamped,
    Outside,
}

/// Square world centered on the origin. The spatial tree's root quadrant
/// covers exactly this square, so every body inside it can be inserted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldBounds {
    pub half_extent: f64,
    pub policy: BoundsPolicy,
}

impl WorldBounds {
    pub fn new(half_extent: f64, policy: BoundsPolicy) -> Self {
        Self { half_extent, policy }
    }

    pub fn contains(&self, p: &Vector) -> bool {
        p.x.abs() <= self.half_extent && p.y.abs() <= self.half_extent
    }

    /// Enforce the bounds on one body according to the policy.
    pub fn check(&self, body: &mut Body) -> BoundsCheck {
        if self.contains(&body.position) {
            return BoundsCheck::Inside;
        }
        match self.policy {
            BoundsPolicy::Diverge => BoundsCheck::Outside,
            BoundsPolicy::Clamp => {
                let e = self.half_extent;
                for axis in 0..2 {
                    let p = body.position[axis];
                    if p > e {
                        body.position[axis] = e;
                        body.velocity[axis] = body.velocity[axis].min(0.0);
                    } else if p < -e {
                        body.position[axis] = -e;
                        body.velocity[axis] = body.velocity[axis].max(0.0);
                    }
                }
                BoundsCheck::Clamped
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Galaxy {
    pub bodies: Vec<Body>,
    pub t: f64, // simulated time
    pub bounds: WorldBounds,
}

impl Galaxy {
    pub fn new(bounds: WorldBounds) -> Self {
        Self {
            bodies: Vec::new(),
            t: 0.0,
            bounds,
        }
    }

    /// Append a body, enforcing the bounds on it right away.
    /// Only call this while the simulation is paused or not yet started.
    pub fn push(&mut self, mut body: Body) -> BoundsCheck {
        let check = self.bounds.check(&mut body);
        self.bodies.push(body);
        check
    }

    /// Enforce the world bounds on body `i`.
    pub fn check_limit(&mut self, i: usize) -> BoundsCheck {
        let bounds = self.bounds;
        bounds.check(&mut self.bodies[i])
    }

    pub fn total_mass(&self) -> f64 {
        self.bodies.iter().map(|b| b.mass).sum()
    }

    /// Mass-weighted centroid. The origin for an empty or massless galaxy.
    pub fn center(&self) -> Vector {
        let m = self.total_mass();
        if m <= 0.0 {
            return Vector::zeros();
        }
        self.bodies
            .iter()
            .fold(Vector::zeros(), |acc, b| acc + b.position * b.mass)
            / m
    }

    /// Shift every body so the centroid sits on the origin.
    pub fn recenter(&mut self) {
        let c = self.center();
        for b in self.bodies.iter_mut() {
            b.position -= c;
        }
        for i in 0..self.bodies.len() {
            self.check_limit(i);
        }
    }
}
