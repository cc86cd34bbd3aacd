//! Robust sample-consensus fits for two-view geometry.
//!
//! Two fits are provided: a planar homography (4-point minimal sample) and
//! a fundamental matrix (8-point minimal sample). Both are seeded and
//! therefore exactly reproducible for identical inputs.

use nalgebra::{DMatrix, Matrix3, Point2, Vector3};
use rand::prelude::*;
use serde::{Deserialize, Serialize};

use crate::homography::{estimate_homography, homography_from_4pt, normalize_points};
use crate::Homography;

/// Errors produced by the robust fits.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RobustFitError {
    #[error("too few points: need {needed}, got {got}")]
    TooFewPoints { needed: usize, got: usize },

    #[error("insufficient inliers: need {needed}, found {found}")]
    InsufficientInliers { needed: usize, found: usize },

    #[error("numerical failure: {0}")]
    NumericalFailure(&'static str),
}

/// Configuration for [`fit_homography_ransac`].
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct RansacHomographyParams {
    pub max_iters: usize,
    /// Inlier threshold on reprojection error, in pixels.
    pub inlier_threshold: f64,
    /// Minimum consensus size for a valid model.
    pub min_inliers: usize,
    pub seed: u64,
}

impl Default for RansacHomographyParams {
    fn default() -> Self {
        Self {
            max_iters: 700,
            inlier_threshold: 4.0,
            min_inliers: 4,
            seed: 0,
        }
    }
}

/// Result of [`fit_homography_ransac`].
#[derive(Clone, Debug)]
pub struct RansacHomographyResult {
    pub homography: Homography,
    /// One entry per input pair; true for inliers of the final model.
    pub inlier_mask: Vec<bool>,
    pub inlier_count: usize,
    /// Reprojection error per input pair under the final model.
    pub errors: Vec<f64>,
}

/// Configuration for [`fit_fundamental_ransac`].
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct RansacFundamentalParams {
    pub max_iters: usize,
    /// Inlier threshold on Sampson distance, in pixels.
    pub inlier_threshold: f64,
    /// Confidence target driving the adaptive iteration bound.
    pub confidence: f64,
    /// Minimum consensus size for a valid model.
    pub min_inliers: usize,
    pub seed: u64,
}

impl Default for RansacFundamentalParams {
    fn default() -> Self {
        Self {
            max_iters: 1000,
            inlier_threshold: 4.0,
            confidence: 0.999,
            min_inliers: 8,
            seed: 0,
        }
    }
}

/// Result of [`fit_fundamental_ransac`].
#[derive(Clone, Debug)]
pub struct RansacFundamentalResult {
    pub f: Matrix3<f64>,
    /// One entry per input pair; true for inliers of the final model.
    pub inlier_mask: Vec<bool>,
    pub inlier_count: usize,
}

/// Partial Fisher-Yates: after the call, `pool[..k]` holds `k` distinct
/// indices drawn uniformly from the pool.
fn sample_distinct(rng: &mut StdRng, pool: &mut [usize], k: usize) {
    for i in 0..k {
        let j = rng.gen_range(i..pool.len());
        pool.swap(i, j);
    }
}

fn reprojection_distance(h: &Homography, src: Point2<f64>, dst: Point2<f64>) -> f64 {
    let p = h.apply(src);
    let dx = p.x - dst.x;
    let dy = p.y - dst.y;
    (dx * dx + dy * dy).sqrt()
}

/// Fit a homography `dst ~ H * src` with RANSAC over 4-point samples.
///
/// The best consensus model is refit on all of its inliers, and the final
/// mask and per-pair errors are recomputed under the refit model.
pub fn fit_homography_ransac(
    src: &[Point2<f64>],
    dst: &[Point2<f64>],
    params: &RansacHomographyParams,
) -> Result<RansacHomographyResult, RobustFitError> {
    let n = src.len();
    debug_assert_eq!(n, dst.len(), "src and dst must pair up");
    if n < 4 {
        return Err(RobustFitError::TooFewPoints { needed: 4, got: n });
    }

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut pool: Vec<usize> = (0..n).collect();

    let mut best_count = 0usize;
    let mut best_mask = vec![false; n];
    let mut best_h = Homography::identity();

    for _ in 0..params.max_iters {
        sample_distinct(&mut rng, &mut pool, 4);
        let s4 = [
            src[pool[0]],
            src[pool[1]],
            src[pool[2]],
            src[pool[3]],
        ];
        let d4 = [
            dst[pool[0]],
            dst[pool[1]],
            dst[pool[2]],
            dst[pool[3]],
        ];

        let Some(h) = homography_from_4pt(&s4, &d4) else {
            continue;
        };

        let mut count = 0usize;
        let mut mask = vec![false; n];
        for i in 0..n {
            if reprojection_distance(&h, src[i], dst[i]) < params.inlier_threshold {
                mask[i] = true;
                count += 1;
            }
        }

        if count > best_count {
            best_count = count;
            best_mask = mask;
            best_h = h;

            // Early exit once the consensus covers >90% of the pairs.
            if count * 10 > n * 9 {
                break;
            }
        }
    }

    if best_count < params.min_inliers.max(4) {
        return Err(RobustFitError::InsufficientInliers {
            needed: params.min_inliers.max(4),
            found: best_count,
        });
    }

    // Refit on all consensus inliers.
    let in_src: Vec<Point2<f64>> = (0..n).filter(|&i| best_mask[i]).map(|i| src[i]).collect();
    let in_dst: Vec<Point2<f64>> = (0..n).filter(|&i| best_mask[i]).map(|i| dst[i]).collect();
    let h = estimate_homography(&in_src, &in_dst).unwrap_or(best_h);

    let mut mask = vec![false; n];
    let mut errors = vec![0.0f64; n];
    let mut count = 0usize;
    for i in 0..n {
        let err = reprojection_distance(&h, src[i], dst[i]);
        errors[i] = err;
        if err < params.inlier_threshold {
            mask[i] = true;
            count += 1;
        }
    }

    Ok(RansacHomographyResult {
        homography: h,
        inlier_mask: mask,
        inlier_count: count,
        errors,
    })
}

/// First-order (Sampson) squared distance of a correspondence to the
/// epipolar geometry described by `f`.
fn sampson_distance_sq(f: &Matrix3<f64>, a: Point2<f64>, b: Point2<f64>) -> f64 {
    let x1 = Vector3::new(a.x, a.y, 1.0);
    let x2 = Vector3::new(b.x, b.y, 1.0);
    let fx1 = f * x1;
    let ftx2 = f.transpose() * x2;

    let residual = x2.dot(&fx1);
    let denom = fx1[0] * fx1[0] + fx1[1] * fx1[1] + ftx2[0] * ftx2[0] + ftx2[1] * ftx2[1];
    if denom <= f64::EPSILON {
        return f64::INFINITY;
    }
    residual * residual / denom
}

/// Linear 8-point fundamental-matrix solve over the selected pairs, with
/// Hartley normalization and rank-2 enforcement.
fn fundamental_from_pairs(
    pts_a: &[Point2<f64>],
    pts_b: &[Point2<f64>],
    selected: &[usize],
) -> Option<Matrix3<f64>> {
    let n = selected.len();
    if n < 8 {
        return None;
    }

    let sel_a: Vec<Point2<f64>> = selected.iter().map(|&i| pts_a[i]).collect();
    let sel_b: Vec<Point2<f64>> = selected.iter().map(|&i| pts_b[i]).collect();
    let (norm_a, t_a) = normalize_points(&sel_a);
    let (norm_b, t_b) = normalize_points(&sel_b);

    // Each pair contributes one row of the constraint x2ᵀ F x1 = 0.
    let mut a = DMatrix::<f64>::zeros(n, 9);
    for i in 0..n {
        let x1 = norm_a[i].x;
        let y1 = norm_a[i].y;
        let x2 = norm_b[i].x;
        let y2 = norm_b[i].y;

        a[(i, 0)] = x2 * x1;
        a[(i, 1)] = x2 * y1;
        a[(i, 2)] = x2;
        a[(i, 3)] = y2 * x1;
        a[(i, 4)] = y2 * y1;
        a[(i, 5)] = y2;
        a[(i, 6)] = x1;
        a[(i, 7)] = y1;
        a[(i, 8)] = 1.0;
    }

    // Nullspace of A via the eigenvector of AᵀA with the smallest
    // eigenvalue; sidesteps thin-SVD shape restrictions for n x 9 systems.
    let ata = a.transpose() * &a;
    let eig = nalgebra::SymmetricEigen::new(ata);
    let mut min_idx = 0;
    let mut min_val = eig.eigenvalues[0].abs();
    for i in 1..9 {
        let v = eig.eigenvalues[i].abs();
        if v < min_val {
            min_val = v;
            min_idx = i;
        }
    }
    let fv = eig.eigenvectors.column(min_idx);
    if fv.iter().any(|x| x.is_nan()) {
        return None;
    }
    let f_lin = Matrix3::new(
        fv[0], fv[1], fv[2], //
        fv[3], fv[4], fv[5], //
        fv[6], fv[7], fv[8],
    );

    // Enforce the rank-2 constraint by zeroing the smallest singular value.
    let svd = f_lin.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let mut sv = svd.singular_values;
    sv[2] = 0.0;
    let f_rank2 = u * Matrix3::from_diagonal(&sv) * v_t;

    // Denormalize: F = T_bᵀ · F_n · T_a.
    Some(t_b.transpose() * f_rank2 * t_a)
}

/// Fit a fundamental matrix with RANSAC over 8-point samples.
///
/// Inliers are classified by Sampson distance against
/// `inlier_threshold` pixels; the iteration count adapts to the running
/// inlier ratio so the `confidence` target is met without exhausting
/// `max_iters` on easy problems. The best consensus model is refit on all
/// of its inliers before the final classification.
pub fn fit_fundamental_ransac(
    pts_a: &[Point2<f64>],
    pts_b: &[Point2<f64>],
    params: &RansacFundamentalParams,
) -> Result<RansacFundamentalResult, RobustFitError> {
    let n = pts_a.len();
    debug_assert_eq!(n, pts_b.len(), "point sets must pair up");
    if n < 8 {
        return Err(RobustFitError::TooFewPoints { needed: 8, got: n });
    }

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut pool: Vec<usize> = (0..n).collect();
    let threshold_sq = params.inlier_threshold * params.inlier_threshold;

    let mut best_count = 0usize;
    let mut best_mask = vec![false; n];
    let mut best_f = Matrix3::zeros();
    let mut iters_needed = params.max_iters;

    let mut it = 0usize;
    while it < iters_needed {
        it += 1;
        sample_distinct(&mut rng, &mut pool, 8);

        let Some(f) = fundamental_from_pairs(pts_a, pts_b, &pool[..8]) else {
            continue;
        };

        let mut count = 0usize;
        let mut mask = vec![false; n];
        for i in 0..n {
            if sampson_distance_sq(&f, pts_a[i], pts_b[i]) < threshold_sq {
                mask[i] = true;
                count += 1;
            }
        }

        if count > best_count {
            best_count = count;
            best_mask = mask;
            best_f = f;

            // Standard adaptive bound: iterations needed to draw one
            // all-inlier sample with the requested confidence.
            let w = count as f64 / n as f64;
            let p_sample = w.powi(8);
            if p_sample >= 1.0 {
                break;
            }
            if p_sample > 1e-12 {
                let k = (1.0 - params.confidence).ln() / (1.0 - p_sample).ln();
                if k.is_finite() {
                    iters_needed = iters_needed.min(k.ceil().max(1.0) as usize);
                }
            }
        }
    }

    if best_count < params.min_inliers.max(8) {
        return Err(RobustFitError::InsufficientInliers {
            needed: params.min_inliers.max(8),
            found: best_count,
        });
    }

    // Refit on all consensus inliers and reclassify.
    let inlier_idx: Vec<usize> = (0..n).filter(|&i| best_mask[i]).collect();
    let f = fundamental_from_pairs(pts_a, pts_b, &inlier_idx).unwrap_or(best_f);

    let mut mask = vec![false; n];
    let mut count = 0usize;
    for i in 0..n {
        if sampson_distance_sq(&f, pts_a[i], pts_b[i]) < threshold_sq {
            mask[i] = true;
            count += 1;
        }
    }

    Ok(RansacFundamentalResult {
        f,
        inlier_mask: mask,
        inlier_count: count,
    })
}
