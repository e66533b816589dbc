//! Sum-of-pairs scoring of a multiple alignment

use crate::align::score_columns;
use crate::error::Result;
use crate::matrix::SimilarityMatrix;
use rayon::prelude::*;

/// Sum over all row pairs of the affine pairwise score of their projection.
/// Columns that are gaps in both rows of a pair are skipped, so a gap run
/// interrupted only by such columns counts as one gap.
pub fn sum_of_pairs(
    rows: &[Vec<u8>],
    matrix: &SimilarityMatrix,
    gap_open: i32,
    gap_extension: i32,
) -> Result<i64> {
    let pairs: Vec<(usize, usize)> = (0..rows.len())
        .flat_map(|i| (i + 1..rows.len()).map(move |j| (i, j)))
        .collect();
    let scores = pairs
        .par_iter()
        .map(|&(i, j)| score_columns(&rows[i], &rows[j], matrix, gap_open, gap_extension))
        .collect::<Result<Vec<i64>>>()?;
    Ok(scores.into_iter().sum())
}
