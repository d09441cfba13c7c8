//! Fixed-step leapfrog integration for the galaxy
//!
//! One force evaluation per step. Forces for step n are computed into
//! `next_acceleration` before this runs; here
//! - position:     x += v dt + a dt²/2   (current velocity and acceleration)
//! - velocity:     v += (a + a_next) dt/2
//! - acceleration: a = a_next
//!
//! followed by the world-bounds check on every body.

use log::{error, warn};

use crate::error::{Result, SimError};
use crate::simulation::states::{Body, BoundsCheck, Galaxy};

/// Advance a single body by `dt`.
pub fn advance_body(b: &mut Body, dt: f64) {
    let half_dt = 0.5 * dt;
    b.position += b.velocity * dt + b.acceleration * (half_dt * dt);
    b.velocity += (b.acceleration + b.next_acceleration) * half_dt;
    b.acceleration = b.next_acceleration;
}

/// Advance every body of the galaxy by `dt` and enforce the world bounds.
///
/// Returns [`SimError::Diverged`] for the first body found outside the world
/// under `BoundsPolicy::Diverge`; the remaining bodies are still advanced so
/// the galaxy reflects one whole step.
pub fn integrate(g: &mut Galaxy, dt: f64) -> Result<()> {
    let mut diverged = None;
    for i in 0..g.bodies.len() {
        advance_body(&mut g.bodies[i], dt);
        match g.check_limit(i) {
            BoundsCheck::Inside => {}
            BoundsCheck::Clamped => warn!("body {i} clamped to world bounds"),
            BoundsCheck::Outside => {
                if diverged.is_none() {
                    diverged = Some(i);
                }
            }
        }
    }
    g.t += dt;

    match diverged {
        Some(body) => {
            let position = g.bodies[body].position;
            error!("body {body} left the world at {position:?}");
            Err(SimError::Diverged { body, position })
        }
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::states::{BoundsPolicy, Vector, WorldBounds};

    #[test]
    fn free_body_moves_in_a_straight_line() {
        let mut b = Body::new(1.0, Vector::new(1.0, 2.0), Vector::new(3.0, -1.0), 1.0);
        advance_body(&mut b, 0.5);
        assert_eq!(b.position, Vector::new(2.5, 1.5));
        assert_eq!(b.velocity, Vector::new(3.0, -1.0));
    }

    #[test]
    fn velocity_uses_average_acceleration_and_slots_rotate() {
        let mut b = Body::new(1.0, Vector::zeros(), Vector::zeros(), 1.0);
        b.acceleration = Vector::new(2.0, 0.0);
        b.next_acceleration = Vector::new(4.0, 2.0);
        advance_body(&mut b, 1.0);

        assert_eq!(b.position, Vector::new(1.0, 0.0));
        assert_eq!(b.velocity, Vector::new(3.0, 1.0));
        assert_eq!(b.acceleration, Vector::new(4.0, 2.0));
    }

    #[test]
    fn diverging_body_is_reported_but_step_completes() {
        let mut g = Galaxy::new(WorldBounds::new(10.0, BoundsPolicy::Diverge));
        g.push(Body::new(1.0, Vector::new(9.0, 0.0), Vector::new(4.0, 0.0), 1.0));
        g.push(Body::new(1.0, Vector::zeros(), Vector::new(0.0, 1.0), 1.0));

        let err = integrate(&mut g, 1.0).unwrap_err();
        assert!(matches!(err, SimError::Diverged { body: 0, .. }));
        assert_eq!(g.bodies[1].position, Vector::new(0.0, 1.0));
        assert_eq!(g.t, 1.0);
    }

    #[test]
    fn clamping_keeps_the_step_going() {
        let mut g = Galaxy::new(WorldBounds::new(10.0, BoundsPolicy::Clamp));
        g.push(Body::new(1.0, Vector::new(9.0, 0.0), Vector::new(4.0, 0.0), 1.0));
        integrate(&mut g, 1.0).unwrap();
        assert_eq!(g.bodies[0].position, Vector::new(10.0, 0.0));
        assert_eq!(g.bodies[0].velocity, Vector::zeros());
    }
}
