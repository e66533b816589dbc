//! Pairwise distances for guide-tree construction
//!
//! Stage 1 compares k-mer count vectors; stage 2 uses Kimura-corrected
//! identities measured on an existing alignment.

use crate::cancel::{checkpoint, CancellationToken};
use crate::error::Result;
use crate::types::GAP;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Distance used when two aligned rows share no comparable columns or are
/// too divergent for the Kimura correction
pub const MAX_KIMURA_DISTANCE: f64 = 10.0;

/// How two k-mer count vectors are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DistanceFunction {
    #[default]
    EuclideanDistance,
    PearsonCorrelation,
    CoVariance,
    /// MUSCLE-style shared k-mer fraction
    ModifiedMuscle,
}

/// k-mer counts of one sequence, ordered by k-mer
#[derive(Debug, Clone, Default)]
pub struct KmerCounts {
    counts: BTreeMap<Vec<u8>, u32>,
    /// Length of the sequence the counts come from
    sequence_length: usize,
    kmer_length: usize,
}

impl KmerCounts {
    pub fn new(symbols: &[u8], kmer_length: usize) -> Self {
        let mut counts = BTreeMap::new();
        if kmer_length > 0 {
            for window in symbols.windows(kmer_length) {
                *counts.entry(window.to_vec()).or_insert(0) += 1;
            }
        }
        Self {
            counts,
            sequence_length: symbols.len(),
            kmer_length,
        }
    }

    pub fn get(&self, kmer: &[u8]) -> u32 {
        self.counts.get(kmer).copied().unwrap_or(0)
    }

    pub fn distinct(&self) -> usize {
        self.counts.len()
    }

    /// Counts of both vectors over the union of their k-mers
    fn paired(&self, other: &KmerCounts) -> Vec<(f64, f64)> {
        let mut keys: Vec<&Vec<u8>> = self.counts.keys().chain(other.counts.keys()).collect();
        keys.sort();
        keys.dedup();
        keys.into_iter()
            .map(|k| (self.get(k) as f64, other.get(k) as f64))
            .collect()
    }
}

impl DistanceFunction {
    pub fn distance(&self, a: &KmerCounts, b: &KmerCounts) -> f64 {
        match self {
            DistanceFunction::EuclideanDistance => a
                .paired(b)
                .iter()
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f64>()
                .sqrt(),
            DistanceFunction::PearsonCorrelation => {
                let pairs = a.paired(b);
                let (var_x, var_y, cov) = moments(&pairs);
                if var_x == 0.0 || var_y == 0.0 {
                    return if pairs.iter().all(|(x, y)| x == y) { 0.0 } else { 1.0 };
                }
                1.0 - cov / (var_x * var_y).sqrt()
            }
            DistanceFunction::CoVariance => {
                // half the variance of the count difference
                let (var_x, var_y, cov) = moments(&a.paired(b));
                ((var_x + var_y) / 2.0 - cov).max(0.0)
            }
            DistanceFunction::ModifiedMuscle => {
                let shortest = a.sequence_length.min(b.sequence_length);
                if shortest < a.kmer_length || a.kmer_length == 0 {
                    return 1.0;
                }
                let shared: u32 = a
                    .counts
                    .iter()
                    .map(|(kmer, &count)| count.min(b.get(kmer)))
                    .sum();
                let windows = (shortest - a.kmer_length + 1) as f64;
                1.0 - shared as f64 / windows
            }
        }
    }
}

/// Population variances and covariance of paired samples
fn moments(pairs: &[(f64, f64)]) -> (f64, f64, f64) {
    if pairs.is_empty() {
        return (0.0, 0.0, 0.0);
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut var_x, mut var_y, mut cov) = (0.0, 0.0, 0.0);
    for &(x, y) in pairs {
        var_x += (x - mean_x) * (x - mean_x);
        var_y += (y - mean_y) * (y - mean_y);
        cov += (x - mean_x) * (y - mean_y);
    }
    (var_x / n, var_y / n, cov / n)
}

/// Symmetric distance matrix with a zero diagonal
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    dimension: usize,
    values: Vec<f64>,
}

impl DistanceMatrix {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            values: vec![0.0; dimension * dimension],
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.dimension + j]
    }

    /// Set both `(i, j)` and `(j, i)`
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        if i == j {
            return;
        }
        self.values[i * self.dimension + j] = value;
        self.values[j * self.dimension + i] = value;
    }

    /// Fill the upper triangle in parallel. `distance` must be pure.
    fn from_pairs<F>(dimension: usize, partitions: usize, distance: F) -> Self
    where
        F: Fn(usize, usize) -> f64 + Sync,
    {
        let pairs: Vec<(usize, usize)> = (0..dimension)
            .flat_map(|i| (i + 1..dimension).map(move |j| (i, j)))
            .collect();
        let chunk = (pairs.len() / partitions.max(1)).max(1);
        let values: Vec<f64> = pairs
            .par_iter()
            .with_min_len(chunk)
            .map(|&(i, j)| distance(i, j))
            .collect();

        let mut matrix = Self::new(dimension);
        for (&(i, j), value) in pairs.iter().zip(values) {
            matrix.set(i, j, value);
        }
        matrix
    }
}

/// All-pairs k-mer distances
pub fn kmer_distance_matrix(
    sequences: &[&[u8]],
    kmer_length: usize,
    function: DistanceFunction,
    partitions: usize,
    cancel: Option<&CancellationToken>,
) -> Result<DistanceMatrix> {
    checkpoint(cancel)?;
    let counts: Vec<KmerCounts> = sequences
        .par_iter()
        .map(|s| KmerCounts::new(s, kmer_length))
        .collect();
    let matrix = DistanceMatrix::from_pairs(sequences.len(), partitions, |i, j| {
        function.distance(&counts[i], &counts[j])
    });
    checkpoint(cancel)?;
    Ok(matrix)
}

/// Kimura distance between two aligned rows: `-ln(1 - p - 0.2 p^2)` where `p`
/// is the fraction of differing columns among columns with no gap
pub fn kimura_distance(first: &[u8], second: &[u8]) -> f64 {
    let (mut compared, mut differ) = (0usize, 0usize);
    for (&a, &b) in first.iter().zip(second) {
        if a == GAP || b == GAP {
            continue;
        }
        compared += 1;
        if a != b {
            differ += 1;
        }
    }
    if compared == 0 {
        return MAX_KIMURA_DISTANCE;
    }
    let p = differ as f64 / compared as f64;
    let argument = 1.0 - p - 0.2 * p * p;
    if argument <= 0.0 {
        return MAX_KIMURA_DISTANCE;
    }
    (-argument.ln()).min(MAX_KIMURA_DISTANCE)
}

/// All-pairs Kimura distances over the rows of an alignment
pub fn kimura_distance_matrix(
    rows: &[Vec<u8>],
    partitions: usize,
    cancel: Option<&CancellationToken>,
) -> Result<DistanceMatrix> {
    checkpoint(cancel)?;
    Ok(DistanceMatrix::from_pairs(rows.len(), partitions, |i, j| {
        kimura_distance(&rows[i], &rows[j])
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kmer_counts() {
        let counts = KmerCounts::new(b"ACGACG", 3);
        assert_eq!(counts.get(b"ACG"), 2);
        assert_eq!(counts.get(b"CGA"), 1);
        assert_eq!(counts.get(b"TTT"), 0);
        assert_eq!(counts.distinct(), 3);
        assert_eq!(KmerCounts::new(b"AC", 3).distinct(), 0);
    }

    #[test]
    fn test_identical_sequences_have_zero_distance() {
        let a = KmerCounts::new(b"ACGTACGTTA", 3);
        for function in [
            DistanceFunction::EuclideanDistance,
            DistanceFunction::PearsonCorrelation,
            DistanceFunction::CoVariance,
            DistanceFunction::ModifiedMuscle,
        ] {
            assert!(function.distance(&a, &a).abs() < 1e-12, "{:?}", function);
        }
    }

    #[test]
    fn test_euclidean_distance() {
        let a = KmerCounts::new(b"AAAA", 2);
        let b = KmerCounts::new(b"CCCC", 2);
        // AA: 3 vs 0, CC: 0 vs 3
        let d = DistanceFunction::EuclideanDistance.distance(&a, &b);
        assert!((d - 18f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_modified_muscle_disjoint() {
        let a = KmerCounts::new(b"AAAA", 2);
        let b = KmerCounts::new(b"CCCC", 2);
        assert_eq!(DistanceFunction::ModifiedMuscle.distance(&a, &b), 1.0);
    }

    #[test]
    fn test_matrix_is_symmetric() {
        let seqs: Vec<&[u8]> = vec![&b"ACGTACGT"[..], &b"ACGTTCGT"[..], &b"TTTTGGGG"[..], &b"ACG"[..]];
        let matrix =
            kmer_distance_matrix(&seqs, 2, DistanceFunction::EuclideanDistance, 2, None).unwrap();
        for i in 0..4 {
            assert_eq!(matrix.get(i, i), 0.0);
            for j in 0..4 {
                assert_eq!(matrix.get(i, j), matrix.get(j, i));
            }
        }
        assert!(matrix.get(0, 1) < matrix.get(0, 2));
    }

    #[test]
    fn test_kimura_distance() {
        assert_eq!(kimura_distance(b"ACGT", b"ACGT"), 0.0);
        let d = kimura_distance(b"ACGT-A", b"ACGA-A");
        let p: f64 = 0.2;
        assert!((d + (1.0 - p - 0.2 * p * p).ln()).abs() < 1e-12);
        assert_eq!(kimura_distance(b"AC--", b"--GT"), MAX_KIMURA_DISTANCE);
        assert_eq!(kimura_distance(b"AAAA", b"CCCC"), MAX_KIMURA_DISTANCE);
    }

    #[test]
    fn test_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let seqs: Vec<&[u8]> = vec![&b"ACGT"[..], &b"ACGA"[..]];
        assert!(kmer_distance_matrix(
            &seqs,
            2,
            DistanceFunction::EuclideanDistance,
            1,
            Some(&token)
        )
        .is_err());
    }
}
