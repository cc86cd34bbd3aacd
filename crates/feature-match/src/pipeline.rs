//! End-to-end registration of one keypoint pair.
//!
//! Stage order follows a template-tracking loop: descriptor matching,
//! optional grid deduplication, optional epipolar outlier rejection, robust
//! homography fit, Gauss-Newton refinement on the consensus inliers. The
//! pipeline degrades stage-by-stage: a failed epipolar check keeps the
//! unfiltered matches, a failed homography fit still returns the
//! correspondence list, and a homography that cannot be refined is returned
//! as the robust solver produced it.

use log::{debug, info};
use nalgebra::{DMatrix, Point2};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use feature_match_core::{
    fit_homography_ransac, grid_filter_matches, match_descriptors, refine_homography,
    reject_outliers, GridFilterParams, Homography, Keypoint, Match, RansacFundamentalParams,
    RansacHomographyParams, DEFAULT_REFINE_ITERATIONS,
};

/// Minimum matches for attempting a homography fit at all.
const MIN_HOMOGRAPHY_MATCHES: usize = 4;

/// Minimum consensus inliers before refinement is worthwhile.
const MIN_REFINE_PAIRS: usize = 8;

/// Parameters for [`MatchPipeline`].
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PipelineParams {
    /// Similarity threshold for the mutual-NN matcher.
    pub min_score: f32,

    /// Grid deduplication of matches; `None` disables the stage.
    pub grid_filter: Option<GridFilterParams>,

    /// Epipolar outlier rejection; `None` disables the stage.
    pub epipolar: Option<RansacFundamentalParams>,

    pub homography: RansacHomographyParams,

    /// Gauss-Newton iteration budget for the refinement stage.
    pub refine_iterations: usize,

    /// Train-image extent, used by the grid filter.
    pub image_width: f32,
    pub image_height: f32,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            min_score: 0.82,
            grid_filter: Some(GridFilterParams::default()),
            epipolar: Some(RansacFundamentalParams::default()),
            homography: RansacHomographyParams::default(),
            refine_iterations: DEFAULT_REFINE_ITERATIONS,
            image_width: 640.0,
            image_height: 640.0,
        }
    }
}

/// Outcome of one registration.
#[derive(Clone, Debug)]
pub struct Registration {
    /// Correspondences surviving every filtering stage.
    pub matches: Vec<Match>,

    /// Refined homography mapping query keypoints onto train keypoints;
    /// `None` when matching or the robust fit failed.
    pub homography: Option<Homography>,

    /// Consensus size of the robust homography fit.
    pub inlier_count: usize,

    /// `inlier_count / matches.len()`; callers typically gate overlay or
    /// tracking decisions on this ratio.
    pub confidence: f64,
}

impl Registration {
    fn without_homography(matches: Vec<Match>) -> Self {
        Self {
            matches,
            homography: None,
            inlier_count: 0,
            confidence: 0.0,
        }
    }
}

/// Chains the matching and registration stages over one pair of keypoint
/// sets.
pub struct MatchPipeline {
    pub params: PipelineParams,
}

impl MatchPipeline {
    pub fn new(params: PipelineParams) -> Self {
        Self { params }
    }

    /// Match `descs_a` against `descs_b` and estimate the homography
    /// mapping query keypoints onto train keypoints.
    ///
    /// Keypoint slices and descriptor rows must correspond 1:1 by index.
    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "info",
            skip_all,
            fields(query = keypoints_a.len(), train = keypoints_b.len())
        )
    )]
    pub fn register(
        &self,
        keypoints_a: &[Keypoint],
        descs_a: &DMatrix<f32>,
        keypoints_b: &[Keypoint],
        descs_b: &DMatrix<f32>,
    ) -> Registration {
        debug_assert_eq!(keypoints_a.len(), descs_a.nrows());
        debug_assert_eq!(keypoints_b.len(), descs_b.nrows());

        let mut matches = match_descriptors(descs_a, descs_b, self.params.min_score);
        debug!("mutual-NN matches: {}", matches.len());

        if let Some(grid) = &self.params.grid_filter {
            matches = grid_filter_matches(
                keypoints_b,
                &matches,
                self.params.image_width,
                self.params.image_height,
                grid,
            );
            debug!("after grid filter: {}", matches.len());
        }

        if let Some(epipolar) = &self.params.epipolar {
            let (pts_a, pts_b) = paired_points(keypoints_a, keypoints_b, &matches);
            match reject_outliers(&pts_a, &pts_b, &matches, epipolar) {
                Ok(filtered) => {
                    debug!("after epipolar rejection: {}", filtered.len());
                    matches = filtered;
                }
                Err(err) => debug!("epipolar rejection skipped: {err}"),
            }
        }

        if matches.len() < MIN_HOMOGRAPHY_MATCHES {
            info!("too few matches for a homography: {}", matches.len());
            return Registration::without_homography(matches);
        }

        let (pts_a, pts_b) = paired_points(keypoints_a, keypoints_b, &matches);
        let fit = match fit_homography_ransac(&pts_a, &pts_b, &self.params.homography) {
            Ok(fit) => fit,
            Err(err) => {
                info!("homography fit failed: {err}");
                return Registration::without_homography(matches);
            }
        };

        let confidence = fit.inlier_count as f64 / matches.len() as f64;
        debug!(
            "homography consensus: {} of {} (confidence {:.2})",
            fit.inlier_count,
            matches.len(),
            confidence
        );

        let mut homography = fit.homography;
        if fit.inlier_count >= MIN_REFINE_PAIRS {
            let in_a: Vec<Point2<f64>> = pts_a
                .iter()
                .zip(&fit.inlier_mask)
                .filter(|(_, &keep)| keep)
                .map(|(p, _)| *p)
                .collect();
            let in_b: Vec<Point2<f64>> = pts_b
                .iter()
                .zip(&fit.inlier_mask)
                .filter(|(_, &keep)| keep)
                .map(|(p, _)| *p)
                .collect();
            homography = refine_homography(homography, &in_a, &in_b, self.params.refine_iterations);
        }

        Registration {
            matches,
            homography: Some(homography),
            inlier_count: fit.inlier_count,
            confidence,
        }
    }
}

/// Extract the coordinate pair of every correspondence, in match order.
fn paired_points(
    keypoints_a: &[Keypoint],
    keypoints_b: &[Keypoint],
    matches: &[Match],
) -> (Vec<Point2<f64>>, Vec<Point2<f64>>) {
    let mut pts_a = Vec::with_capacity(matches.len());
    let mut pts_b = Vec::with_capacity(matches.len());
    for m in matches {
        let a = keypoints_a[m.query_idx].position;
        let b = keypoints_b[m.train_idx].position;
        pts_a.push(Point2::new(a.x as f64, a.y as f64));
        pts_b.push(Point2::new(b.x as f64, b.y as f64));
    }
    (pts_a, pts_b)
}
