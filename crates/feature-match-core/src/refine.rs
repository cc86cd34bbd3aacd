//! Gauss-Newton refinement of a homography against point correspondences.
//!
//! A bare damped Gauss-Newton solve: numerical forward-difference Jacobian,
//! SVD least-squares step, step-norm clamp. It does not guarantee global
//! convergence and can wander on poor initial estimates or near-degenerate
//! point configurations; callers should check the reprojection residual of
//! the result before trusting it.

use nalgebra::{DMatrix, DVector, Point2};

use crate::Homography;

/// Default iteration budget for [`refine_homography`].
pub const DEFAULT_REFINE_ITERATIONS: usize = 5;

const JACOBIAN_EPS: f64 = 1e-6;
const MAX_STEP_NORM: f64 = 0.1;
const CONVERGENCE_EPS: f64 = 1e-6;
const SINGULAR_EPS: f64 = 1e-12;

/// Signed reprojection residuals, interleaved as (x, y) per pair.
///
/// Entry `2i` is the x-residual of pair `i` under `h`, entry `2i + 1` the
/// y-residual; the vector has length `2 * src.len()`.
pub fn reprojection_errors(
    h: &Homography,
    src: &[Point2<f64>],
    dst: &[Point2<f64>],
) -> DVector<f64> {
    let mut err = DVector::zeros(2 * src.len());
    for (i, (p, q)) in src.iter().zip(dst).enumerate() {
        let proj = h.apply(*p);
        err[2 * i] = proj.x - q.x;
        err[2 * i + 1] = proj.y - q.y;
    }
    err
}

/// Forward-difference Jacobian of the residual vector with respect to the
/// nine entries of `h`, unrolled row-major.
fn numerical_jacobian(
    h: &Homography,
    src: &[Point2<f64>],
    dst: &[Point2<f64>],
    base: &DVector<f64>,
) -> DMatrix<f64> {
    let mut jac = DMatrix::zeros(2 * src.len(), 9);
    for k in 0..9 {
        let mut perturbed = *h;
        perturbed.h[(k / 3, k % 3)] += JACOBIAN_EPS;
        let err = reprojection_errors(&perturbed, src, dst);
        for r in 0..err.len() {
            jac[(r, k)] = (err[r] - base[r]) / JACOBIAN_EPS;
        }
    }
    jac
}

/// Iteratively reduce the total reprojection error of `h` over the given
/// inlier pairs.
///
/// Each iteration solves `J·δ = -e` in the least-squares sense via SVD
/// (minimum-norm on rank deficiency), clamps `‖δ‖` to 0.1 against
/// divergence, applies the step and re-normalizes the h33 gauge. Stops
/// early once `‖δ‖ < 1e-6`. Returns the input unchanged for an empty point
/// set.
pub fn refine_homography(
    h: Homography,
    src: &[Point2<f64>],
    dst: &[Point2<f64>],
    iterations: usize,
) -> Homography {
    debug_assert_eq!(src.len(), dst.len(), "src and dst must pair up");
    if src.is_empty() {
        return h;
    }

    let mut h = h;
    for _ in 0..iterations {
        let err = reprojection_errors(&h, src, dst);
        let jac = numerical_jacobian(&h, src, dst, &err);

        let svd = jac.svd(true, true);
        let Ok(mut delta) = svd.solve(&(-err), SINGULAR_EPS) else {
            break;
        };

        let norm = delta.norm();
        if norm > MAX_STEP_NORM {
            delta *= MAX_STEP_NORM / norm;
        }

        for k in 0..9 {
            h.h[(k / 3, k % 3)] += delta[k];
        }
        h = h.normalized();

        if norm < CONVERGENCE_EPS {
            break;
        }
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::prelude::*;

    fn ground_truth() -> Homography {
        Homography::from_array([
            [1.05, 0.02, 8.0],
            [-0.03, 0.98, -5.0],
            [0.00002, -0.00001, 1.0],
        ])
    }

    /// Grid of source points and their noisy images under the ground truth.
    fn noisy_pairs(noise: f64, seed: u64) -> (Vec<Point2<f64>>, Vec<Point2<f64>>) {
        let h = ground_truth();
        let mut rng = StdRng::seed_from_u64(seed);
        let src: Vec<Point2<f64>> = (0..25)
            .map(|i| Point2::new((i % 5) as f64 * 50.0, (i / 5) as f64 * 50.0))
            .collect();
        let dst = src
            .iter()
            .map(|&p| {
                let q = h.apply(p);
                Point2::new(
                    q.x + rng.gen_range(-noise..noise),
                    q.y + rng.gen_range(-noise..noise),
                )
            })
            .collect();
        (src, dst)
    }

    fn sum_squared_error(h: &Homography, src: &[Point2<f64>], dst: &[Point2<f64>]) -> f64 {
        reprojection_errors(h, src, dst).norm_squared()
    }

    #[test]
    fn refinement_reduces_reprojection_error() {
        let (src, dst) = noisy_pairs(0.2, 13);

        // Perturb the affine part of the ground truth.
        let mut start = ground_truth();
        start.h[(0, 0)] += 0.01;
        start.h[(0, 2)] += 2.0;
        start.h[(1, 1)] -= 0.008;
        start.h[(1, 2)] -= 1.5;

        let before = sum_squared_error(&start, &src, &dst);
        let refined = refine_homography(start, &src, &dst, DEFAULT_REFINE_ITERATIONS);
        let after = sum_squared_error(&refined, &src, &dst);

        assert!(
            after < before,
            "refinement must reduce the error: {} -> {}",
            before,
            after
        );
    }

    #[test]
    fn refined_homography_keeps_unit_gauge() {
        let (src, dst) = noisy_pairs(0.1, 29);
        let mut start = ground_truth();
        start.h[(0, 2)] += 1.0;

        let refined = refine_homography(start, &src, &dst, DEFAULT_REFINE_ITERATIONS);
        assert_relative_eq!(refined.h[(2, 2)], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn converged_estimate_stays_put() {
        let h = ground_truth();
        let src: Vec<Point2<f64>> = (0..16)
            .map(|i| Point2::new((i % 4) as f64 * 60.0, (i / 4) as f64 * 60.0))
            .collect();
        let dst: Vec<Point2<f64>> = src.iter().map(|&p| h.apply(p)).collect();

        let refined = refine_homography(h, &src, &dst, DEFAULT_REFINE_ITERATIONS);
        for (a, b) in refined.to_array().iter().flatten().zip(h.to_array().iter().flatten()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-6);
        }
    }

    #[test]
    fn empty_input_returns_start_unchanged() {
        let h = ground_truth();
        let refined = refine_homography(h, &[], &[], DEFAULT_REFINE_ITERATIONS);
        assert_eq!(refined, h);
    }
}
