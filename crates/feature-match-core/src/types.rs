use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// A sparse image keypoint produced by an external feature extractor.
///
/// Keypoints are identified by their position in the sequence the extractor
/// returned them in; every [`Match`] refers to keypoints by that index.
/// `size` and `response` are extractor metadata and are opaque to the
/// matching stages.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    /// Image coordinate in pixels.
    pub position: Point2<f32>,
    /// Support region diameter in pixels.
    pub size: f32,
    /// Detector response strength.
    pub response: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            position: Point2::new(x, y),
            size: 0.0,
            response: 0.0,
        }
    }
}

/// A correspondence between keypoint `query_idx` in the query set and
/// keypoint `train_idx` in the train set.
///
/// `score` is the descriptor similarity that produced the link; higher is
/// better. Every filtering stage in this crate ranks matches by this
/// convention.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub query_idx: usize,
    pub train_idx: usize,
    pub score: f32,
}

impl Match {
    pub fn new(query_idx: usize, train_idx: usize, score: f32) -> Self {
        Self {
            query_idx,
            train_idx,
            score,
        }
    }
}
