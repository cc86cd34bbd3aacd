//! Spatial deduplication of matches over a grid partition of the train
//! image.
//!
//! Mutual-NN matching alone tends to pile correspondences onto a single
//! textured patch, which biases the downstream robust fits. Capping the
//! number of matches per grid cell keeps the spatial distribution even.

use serde::{Deserialize, Serialize};

use crate::{Keypoint, Match};

/// Parameters for [`grid_filter_matches`].
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct GridFilterParams {
    pub grid_cols: usize,
    pub grid_rows: usize,
    /// Matches retained per cell, best score first.
    pub max_per_cell: usize,
}

impl Default for GridFilterParams {
    fn default() -> Self {
        Self {
            grid_cols: 8,
            grid_rows: 8,
            max_per_cell: 5,
        }
    }
}

/// Partition the train-image plane into `grid_cols × grid_rows` equal cells
/// and keep at most `max_per_cell` matches per cell, ranked by descending
/// similarity.
///
/// Each match is binned by the coordinate of its `train_idx` keypoint;
/// a coordinate exactly on the far image border lands in the last cell
/// rather than out of bounds. The output concatenates surviving matches in
/// row-major cell order, so it carries no global ranking.
pub fn grid_filter_matches(
    keypoints_b: &[Keypoint],
    matches: &[Match],
    image_width: f32,
    image_height: f32,
    params: &GridFilterParams,
) -> Vec<Match> {
    let cols = params.grid_cols.max(1);
    let rows = params.grid_rows.max(1);

    let mut grid: Vec<Vec<Match>> = vec![Vec::new(); cols * rows];
    for m in matches {
        let p = keypoints_b[m.train_idx].position;
        let cx = ((p.x / image_width * cols as f32) as usize).min(cols - 1);
        let cy = ((p.y / image_height * rows as f32) as usize).min(rows - 1);
        grid[cy * cols + cx].push(*m);
    }

    let mut out = Vec::with_capacity(matches.len());
    for cell in &mut grid {
        cell.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        out.extend(cell.iter().take(params.max_per_cell));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keypoints(coords: &[(f32, f32)]) -> Vec<Keypoint> {
        coords.iter().map(|&(x, y)| Keypoint::new(x, y)).collect()
    }

    fn matches_for(kps: &[Keypoint], scores: &[f32]) -> Vec<Match> {
        assert_eq!(kps.len(), scores.len());
        scores
            .iter()
            .enumerate()
            .map(|(i, &s)| Match::new(i, i, s))
            .collect()
    }

    #[test]
    fn one_corner_point_per_quadrant_survives() {
        let kps = keypoints(&[(0.0, 0.0), (0.0, 99.0), (99.0, 0.0), (99.0, 99.0)]);
        let matches = matches_for(&kps, &[0.9, 0.8, 0.7, 0.6]);
        let params = GridFilterParams {
            grid_cols: 2,
            grid_rows: 2,
            max_per_cell: 1,
        };

        let kept = grid_filter_matches(&kps, &matches, 100.0, 100.0, &params);
        assert_eq!(kept.len(), 4);
    }

    #[test]
    fn weaker_match_in_occupied_cell_is_dropped() {
        // Fifth point shares the top-left quadrant with (0, 0) but scores
        // worse, so the cap of one evicts it.
        let kps = keypoints(&[
            (0.0, 0.0),
            (0.0, 99.0),
            (99.0, 0.0),
            (99.0, 99.0),
            (1.0, 1.0),
        ]);
        let matches = matches_for(&kps, &[0.9, 0.8, 0.7, 0.6, 0.5]);
        let params = GridFilterParams {
            grid_cols: 2,
            grid_rows: 2,
            max_per_cell: 1,
        };

        let kept = grid_filter_matches(&kps, &matches, 100.0, 100.0, &params);
        assert_eq!(kept.len(), 4);
        assert!(!kept.iter().any(|m| m.train_idx == 4));

        // With the stronger score it wins the cell instead.
        let matches = matches_for(&kps, &[0.5, 0.8, 0.7, 0.6, 0.9]);
        let kept = grid_filter_matches(&kps, &matches, 100.0, 100.0, &params);
        assert_eq!(kept.len(), 4);
        assert!(kept.iter().any(|m| m.train_idx == 4));
        assert!(!kept.iter().any(|m| m.train_idx == 0));
    }

    #[test]
    fn cell_cap_holds_for_every_cell() {
        let kps: Vec<Keypoint> = (0..20)
            .map(|i| Keypoint::new(10.0 + (i % 4) as f32, 10.0 + (i / 4) as f32))
            .collect();
        let scores: Vec<f32> = (0..20).map(|i| i as f32 / 20.0).collect();
        let matches = matches_for(&kps, &scores);
        let params = GridFilterParams {
            grid_cols: 4,
            grid_rows: 4,
            max_per_cell: 3,
        };

        let kept = grid_filter_matches(&kps, &matches, 100.0, 100.0, &params);
        assert_eq!(kept.len(), 3);
        // The three strongest of the shared cell survive.
        let mut kept_scores: Vec<f32> = kept.iter().map(|m| m.score).collect();
        kept_scores.sort_by(|a, b| b.partial_cmp(a).unwrap());
        assert_eq!(kept_scores, vec![0.95, 0.9, 0.85]);
    }

    #[test]
    fn coordinate_on_far_border_lands_in_last_cell() {
        let kps = keypoints(&[(100.0, 100.0)]);
        let matches = matches_for(&kps, &[0.9]);
        let params = GridFilterParams {
            grid_cols: 2,
            grid_rows: 2,
            max_per_cell: 1,
        };

        // Must not panic and must keep the single match.
        let kept = grid_filter_matches(&kps, &matches, 100.0, 100.0, &params);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn indices_survive_filtering_untouched() {
        let kps = keypoints(&[(5.0, 5.0), (95.0, 95.0)]);
        let matches = vec![Match::new(7, 0, 0.9), Match::new(3, 1, 0.8)];
        let params = GridFilterParams::default();

        let kept = grid_filter_matches(&kps, &matches, 100.0, 100.0, &params);
        assert_eq!(kept.len(), 2);
        assert!(kept.contains(&Match::new(7, 0, 0.9)));
        assert!(kept.contains(&Match::new(3, 1, 0.8)));
    }
}
