//! High-level facade for the `feature-match-*` workspace.
//!
//! This crate provides:
//! - stable re-exports of the numerical core
//! - an end-to-end [`pipeline::MatchPipeline`] chaining the stages a
//!   template-tracking loop needs: descriptor matching, spatial
//!   deduplication, epipolar outlier rejection, robust homography fit and
//!   Gauss-Newton refinement.
//!
//! ## Quickstart
//!
//! ```
//! use feature_match::pipeline::{MatchPipeline, PipelineParams};
//! use feature_match::Keypoint;
//! use nalgebra::DMatrix;
//!
//! let pipeline = MatchPipeline::new(PipelineParams::default());
//!
//! let keypoints: Vec<Keypoint> = Vec::new();
//! let descriptors = DMatrix::<f32>::zeros(0, 64);
//! let result = pipeline.register(&keypoints, &descriptors, &keypoints, &descriptors);
//! println!("matches: {}", result.matches.len());
//! ```
//!
//! ## API map
//! - [`core`]: matching, grid filtering, robust fits, refinement.
//! - [`pipeline`]: end-to-end registration of one keypoint pair.

pub use feature_match_core as core;

pub use feature_match_core::{
    match_descriptors, refine_homography, GridFilterParams, Homography, Keypoint, Match,
    RansacFundamentalParams, RansacHomographyParams,
};

pub mod pipeline;
