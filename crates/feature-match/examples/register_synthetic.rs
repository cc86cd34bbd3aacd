//! Register two synthetic keypoint sets related by a known homography and
//! report the pipeline outcome as JSON.
//!
//! Run with `cargo run --example register_synthetic`.

use std::str::FromStr;

use feature_match::core::init_with_level;
use feature_match::pipeline::{MatchPipeline, PipelineParams};
use feature_match::{Homography, Keypoint};
use log::{info, LevelFilter};
use nalgebra::{DMatrix, Point2};
use rand::prelude::*;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ExampleReport {
    num_query: usize,
    num_train: usize,
    num_matches: usize,
    inlier_count: usize,
    confidence: f64,
    homography: Option<[[f64; 3]; 3]>,
}

fn random_unit_rows(rows: usize, dim: usize, rng: &mut StdRng) -> DMatrix<f32> {
    let mut descs = DMatrix::from_fn(rows, dim, |_, _| rng.gen_range(-1.0f32..1.0));
    for mut row in descs.row_iter_mut() {
        let norm = row.norm();
        if norm > 0.0 {
            row /= norm;
        }
    }
    descs
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let log_level = LevelFilter::from_str("debug").unwrap_or(LevelFilter::Info);
    init_with_level(log_level)?;

    // Planted transform: mild scale, shear and perspective.
    let h_true = Homography::from_array([
        [1.04, 0.02, 12.0],
        [-0.01, 0.97, 6.0],
        [0.00001, -0.000008, 1.0],
    ]);

    let mut rng = StdRng::seed_from_u64(1);
    let query_kps: Vec<Keypoint> = (0..144)
        .map(|i| Keypoint::new(30.0 + (i % 12) as f32 * 50.0, 30.0 + (i / 12) as f32 * 50.0))
        .collect();
    let descs_a = random_unit_rows(query_kps.len(), 64, &mut rng);

    // Train side: the warped grid plus unmatched clutter.
    let clutter = 20;
    let mut train_kps: Vec<Keypoint> = query_kps
        .iter()
        .map(|kp| {
            let p = h_true.apply(Point2::new(kp.position.x as f64, kp.position.y as f64));
            Keypoint::new(p.x as f32, p.y as f32)
        })
        .collect();
    let mut descs_b = DMatrix::zeros(train_kps.len() + clutter, 64);
    for i in 0..query_kps.len() {
        descs_b.set_row(i, &descs_a.row(i));
    }
    let clutter_descs = random_unit_rows(clutter, 64, &mut rng);
    for i in 0..clutter {
        train_kps.push(Keypoint::new(
            rng.gen_range(0.0f32..640.0),
            rng.gen_range(0.0f32..640.0),
        ));
        descs_b.set_row(query_kps.len() + i, &clutter_descs.row(i));
    }

    info!(
        "registering {} query keypoints against {} train keypoints",
        query_kps.len(),
        train_kps.len()
    );

    let pipeline = MatchPipeline::new(PipelineParams::default());
    let result = pipeline.register(&query_kps, &descs_a, &train_kps, &descs_b);

    info!(
        "matches: {}  inliers: {}  confidence: {:.2}",
        result.matches.len(),
        result.inlier_count,
        result.confidence
    );

    let report = ExampleReport {
        num_query: query_kps.len(),
        num_train: train_kps.len(),
        num_matches: result.matches.len(),
        inlier_count: result.inlier_count,
        confidence: result.confidence,
        homography: result.homography.map(|h| h.to_array()),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
