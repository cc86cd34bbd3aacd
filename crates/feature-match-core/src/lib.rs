//! Core numerics for sparse keypoint matching and planar registration.
//!
//! This crate is intentionally small and purely numerical. It does *not*
//! depend on any concrete feature extractor, inference runtime or image
//! type: it consumes keypoint coordinates and descriptor matrices produced
//! elsewhere and turns them into geometrically consistent correspondences
//! and an optionally refined homography.
//!
//! Stages compose strictly forward:
//! descriptor matching → spatial deduplication → epipolar outlier
//! rejection → robust homography fit → Gauss-Newton refinement.
//! Each stage is a pure function over immutable inputs; filtering stages
//! remove correspondences but never rewrite their indices.

mod epipolar;
mod grid_filter;
mod homography;
mod logger;
mod matcher;
mod refine;
mod robust;
mod types;

pub use epipolar::{reject_outliers, EpipolarError, MIN_EPIPOLAR_PAIRS};
pub use grid_filter::{grid_filter_matches, GridFilterParams};
pub use homography::{estimate_homography, homography_from_4pt, Homography};
pub use matcher::match_descriptors;
pub use refine::{refine_homography, reprojection_errors, DEFAULT_REFINE_ITERATIONS};
pub use robust::{
    fit_fundamental_ransac, fit_homography_ransac, RansacFundamentalParams,
    RansacFundamentalResult, RansacHomographyParams, RansacHomographyResult, RobustFitError,
};
pub use types::{Keypoint, Match};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
