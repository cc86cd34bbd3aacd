//! Epipolar consistency filtering of correspondences.
//!
//! A thin wrapper around the robust fundamental-matrix fit: pairs that are
//! inconsistent with every rigid two-view geometry cannot be correct
//! matches, whatever their descriptor similarity. Only works for
//! undistorted keypoints; fisheye inputs must be undistorted first.

use log::debug;
use nalgebra::Point2;

use crate::robust::{fit_fundamental_ransac, RansacFundamentalParams, RobustFitError};
use crate::Match;

/// Minimum point pairs for a reliable fundamental-matrix estimate.
pub const MIN_EPIPOLAR_PAIRS: usize = 8;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EpipolarError {
    #[error("too few point pairs: got {got}, need {needed}")]
    TooFewPairs { got: usize, needed: usize },

    #[error(transparent)]
    Fit(#[from] RobustFitError),
}

/// Drop correspondences inconsistent with the dominant epipolar geometry.
///
/// `points_a` and `points_b` hold one coordinate pair per entry of
/// `matches`, extracted by the caller from the keypoint sets. With fewer
/// than [`MIN_EPIPOLAR_PAIRS`] pairs the fit is unreliable and the call
/// fails without touching the input; callers are expected to continue with
/// the unfiltered list. Survivors keep their relative order.
pub fn reject_outliers(
    points_a: &[Point2<f64>],
    points_b: &[Point2<f64>],
    matches: &[Match],
    params: &RansacFundamentalParams,
) -> Result<Vec<Match>, EpipolarError> {
    debug_assert!(
        points_a.len() == points_b.len() && points_a.len() == matches.len(),
        "one point pair per correspondence"
    );
    if matches.len() < MIN_EPIPOLAR_PAIRS {
        return Err(EpipolarError::TooFewPairs {
            got: matches.len(),
            needed: MIN_EPIPOLAR_PAIRS,
        });
    }

    let fit = fit_fundamental_ransac(points_a, points_b, params)?;
    debug!(
        "epipolar check: {} of {} correspondences consistent",
        fit.inlier_count,
        matches.len()
    );

    Ok(matches
        .iter()
        .zip(&fit.inlier_mask)
        .filter(|(_, &keep)| keep)
        .map(|(m, _)| *m)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;

    fn matches_for(n: usize) -> Vec<Match> {
        (0..n).map(|i| Match::new(i, i, 1.0)).collect()
    }

    #[test]
    fn fails_below_minimum_pairs_without_modifying_input() {
        let pts: Vec<Point2<f64>> = (0..7).map(|i| Point2::new(i as f64, 2.0 * i as f64)).collect();
        let matches = matches_for(7);

        let result = reject_outliers(&pts, &pts, &matches, &RansacFundamentalParams::default());
        assert_eq!(
            result.unwrap_err(),
            EpipolarError::TooFewPairs { got: 7, needed: 8 }
        );
        // The caller's list is untouched and still usable.
        assert_eq!(matches.len(), 7);
    }

    #[test]
    fn never_increases_the_correspondence_count_and_preserves_order() {
        // A pure horizontal-shift stereo pair is a valid epipolar geometry.
        let mut rng = StdRng::seed_from_u64(5);
        let pts_a: Vec<Point2<f64>> = (0..24)
            .map(|_| Point2::new(rng.gen_range(0.0..600.0), rng.gen_range(0.0..600.0)))
            .collect();
        let mut pts_b: Vec<Point2<f64>> = pts_a
            .iter()
            .map(|p| Point2::new(p.x + 30.0 + rng.gen_range(-20.0..20.0), p.y))
            .collect();
        // Two vertically displaced pairs violate the geometry.
        pts_b[3].y += 80.0;
        pts_b[17].y -= 60.0;

        let matches = matches_for(24);
        let params = RansacFundamentalParams {
            inlier_threshold: 2.0,
            seed: 1,
            ..Default::default()
        };
        let kept = reject_outliers(&pts_a, &pts_b, &matches, &params).unwrap();

        assert!(kept.len() <= matches.len());
        assert!(!kept.iter().any(|m| m.query_idx == 3 || m.query_idx == 17));
        let indices: Vec<usize> = kept.iter().map(|m| m.query_idx).collect();
        let mut sorted = indices.clone();
        sorted.sort_unstable();
        assert_eq!(indices, sorted, "survivor order must be preserved");
    }
}
