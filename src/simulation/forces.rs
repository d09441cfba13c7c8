//! Gravity law shared by the tree walk and the direct reference sum.

use crate::simulation::states::{Body, Vector};

/// Acceleration at `at` due to a point mass `mass` sitting at `source`.
///
/// a = G * m * r / (|r|² + eps)^(3/2), with r pointing from `at` to `source`.
/// `eps` is added to the squared distance, so the pull stays finite when
/// two bodies (or a body and a cluster's center of mass) coincide.
#[inline]
pub fn softened_pull(at: Vector, source: Vector, mass: f64, g: f64, eps: f64) -> Vector {
    let r = source - at;
    let d2 = r.dot(&r) + eps;
    if d2 == 0.0 {
        return Vector::zeros();
    }
    let inv_r = d2.sqrt().recip();
    let inv_r3 = inv_r * inv_r * inv_r;
    r * (g * mass * inv_r3)
}

/// Direct O(n²) accelerations, one per body, same law as the tree.
/// Used as the exact reference for the approximation and by the benchmarks.
pub fn direct_accelerations(bodies: &[Body], g: f64, eps: f64) -> Vec<Vector> {
    let n = bodies.len();
    let mut out = vec![Vector::zeros(); n];

    // Loop over each unordered pair (i, j) with i < j
    for i in 0..n {
        let bi = &bodies[i];
        for j in (i + 1)..n {
            let bj = &bodies[j];
            let r = bj.position - bi.position;
            let d2 = r.dot(&r) + eps;
            if d2 == 0.0 {
                continue;
            }
            let inv_r = d2.sqrt().recip();
            let coef = g * inv_r * inv_r * inv_r;

            // equal and opposite
            out[i] += r * (coef * bj.mass);
            out[j] -= r * (coef * bi.mass);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pull_points_at_source() {
        let a = softened_pull(Vector::zeros(), Vector::new(3.0, 4.0), 2.0, 1.0, 0.0);
        // |a| = G m / r² = 2 / 25
        assert!((a.norm() - 0.08).abs() < 1e-12);
        assert!(a.dot(&Vector::new(3.0, 4.0)) > 0.0);
    }

    #[test]
    fn coincident_unsoftened_pull_is_zero() {
        let a = softened_pull(Vector::new(1.0, 1.0), Vector::new(1.0, 1.0), 5.0, 1.0, 0.0);
        assert_eq!(a, Vector::zeros());
    }

    #[test]
    fn direct_sum_conserves_momentum() {
        let bodies = vec![
            Body::new(2.0, Vector::new(-1.0, 0.0), Vector::zeros(), 1.0),
            Body::new(3.0, Vector::new(1.0, 0.5), Vector::zeros(), 1.0),
            Body::new(5.0, Vector::new(0.0, 2.0), Vector::zeros(), 1.0),
        ];
        let acc = direct_accelerations(&bodies, 1.0, 0.1);
        let net = bodies
            .iter()
            .zip(acc.iter())
            .fold(Vector::zeros(), |s, (b, a)| s + a * b.mass);
        assert!(net.norm() < 1e-12, "net force not zero: {:?}", net);
    }
}
