//! Mutual-nearest-neighbor descriptor matching with cross-check.

use nalgebra::DMatrix;

use crate::Match;

/// Index of the maximum entry in each row; the lowest column index wins on
/// exact ties.
fn best_per_row(scores: &DMatrix<f32>) -> Vec<usize> {
    let mut best = vec![0usize; scores.nrows()];
    for i in 0..scores.nrows() {
        let mut max_idx = 0;
        let mut max_score = scores[(i, 0)];
        for j in 1..scores.ncols() {
            if scores[(i, j)] > max_score {
                max_score = scores[(i, j)];
                max_idx = j;
            }
        }
        best[i] = max_idx;
    }
    best
}

/// Index of the maximum entry in each column; the lowest row index wins on
/// exact ties.
fn best_per_col(scores: &DMatrix<f32>) -> Vec<usize> {
    let mut best = vec![0usize; scores.ncols()];
    for j in 0..scores.ncols() {
        let mut max_idx = 0;
        let mut max_score = scores[(0, j)];
        for i in 1..scores.nrows() {
            if scores[(i, j)] > max_score {
                max_score = scores[(i, j)];
                max_idx = i;
            }
        }
        best[j] = max_idx;
    }
    best
}

/// Match two descriptor sets by mutual nearest neighbor.
///
/// Descriptors are rows of the input matrices and are assumed normalized so
/// that a row dot product is a bounded similarity. The full similarity
/// matrix `S = A · Bᵀ` is computed once; a correspondence `(i, j)` is
/// emitted iff `j` is the best match of row `i` of A, `i` is the best match
/// of column `j` (cross-check), and `S[(i, j)] > min_score`.
///
/// Either input having zero rows yields an empty result. The output is
/// deterministic for identical inputs and ordered by `query_idx`.
pub fn match_descriptors(
    descs_a: &DMatrix<f32>,
    descs_b: &DMatrix<f32>,
    min_score: f32,
) -> Vec<Match> {
    if descs_a.nrows() == 0 || descs_b.nrows() == 0 {
        return Vec::new();
    }
    debug_assert_eq!(
        descs_a.ncols(),
        descs_b.ncols(),
        "descriptor dimensions must agree"
    );

    let scores = descs_a * descs_b.transpose();

    let best_ab = best_per_row(&scores);
    let best_ba = best_per_col(&scores);

    let mut matches = Vec::new();
    for (i, &j) in best_ab.iter().enumerate() {
        if best_ba[j] == i && scores[(i, j)] > min_score {
            matches.push(Match::new(i, j, scores[(i, j)]));
        }
    }
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Three 4-dimensional descriptors per side, constructed so that
    /// (0, 2) and (1, 1) are mutual best matches while A's row 2 prefers
    /// B's row 0 without reciprocation.
    fn cross_check_fixture() -> (DMatrix<f32>, DMatrix<f32>) {
        let descs_a = DMatrix::from_row_slice(
            3,
            4,
            &[
                1.0, 0.0, 0.0, 0.0, //
                0.0, 1.0, 0.0, 0.0, //
                0.0, 0.6, 0.5, 0.0,
            ],
        );
        let descs_b = DMatrix::from_row_slice(
            3,
            4,
            &[
                0.0, 0.7, 0.3, 0.0, //
                0.0, 0.8, 0.0, 0.0, //
                0.9, 0.0, 0.0, 0.1,
            ],
        );
        (descs_a, descs_b)
    }

    #[test]
    fn cross_check_keeps_only_mutual_matches() {
        let (descs_a, descs_b) = cross_check_fixture();
        let matches = match_descriptors(&descs_a, &descs_b, 0.5);

        assert_eq!(matches.len(), 2);
        assert_eq!((matches[0].query_idx, matches[0].train_idx), (0, 2));
        assert_eq!((matches[1].query_idx, matches[1].train_idx), (1, 1));
        // Scores equal the producing dot products.
        assert_eq!(matches[0].score, 0.9);
        assert_eq!(matches[1].score, 0.8);
        // (2, 0) must be absent: A row 2 prefers B row 0, but B row 0
        // prefers A row 1.
        assert!(!matches.iter().any(|m| m.query_idx == 2));
    }

    #[test]
    fn emitted_matches_are_symmetric_argmaxes() {
        let (descs_a, descs_b) = cross_check_fixture();
        let scores = &descs_a * descs_b.transpose();

        for m in match_descriptors(&descs_a, &descs_b, 0.0) {
            let row_best = best_per_row(&scores)[m.query_idx];
            let col_best = best_per_col(&scores)[m.train_idx];
            assert_eq!(row_best, m.train_idx);
            assert_eq!(col_best, m.query_idx);
        }
    }

    #[test]
    fn threshold_is_strict() {
        let (descs_a, descs_b) = cross_check_fixture();
        // 0.8 is a surviving score; with min_score == 0.8 only the 0.9
        // match survives.
        let matches = match_descriptors(&descs_a, &descs_b, 0.8);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].score, 0.9);

        assert!(match_descriptors(&descs_a, &descs_b, 1.0).is_empty());
    }

    #[test]
    fn identical_inputs_give_identical_output() {
        let (descs_a, descs_b) = cross_check_fixture();
        let first = match_descriptors(&descs_a, &descs_b, 0.3);
        let second = match_descriptors(&descs_a, &descs_b, 0.3);
        assert_eq!(first, second);
    }

    #[test]
    fn tie_breaks_to_lowest_index() {
        let descs_a = DMatrix::from_row_slice(1, 2, &[1.0, 0.0]);
        // Two identical rows in B: the first must win both argmaxes.
        let descs_b = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 1.0, 0.0]);

        let matches = match_descriptors(&descs_a, &descs_b, 0.5);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].train_idx, 0);
    }

    #[test]
    fn empty_inputs_yield_empty_output() {
        let empty = DMatrix::<f32>::zeros(0, 4);
        let (descs_a, _) = cross_check_fixture();
        assert!(match_descriptors(&empty, &descs_a, 0.0).is_empty());
        assert!(match_descriptors(&descs_a, &empty, 0.0).is_empty());
    }
}
