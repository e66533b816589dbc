//! Profiles and profile-profile Needleman-Wunsch alignment

use crate::align::Op;
use crate::cancel::{checkpoint, CancellationToken};
use crate::error::{Error, Result};
use crate::matrix::SimilarityMatrix;
use crate::types::GAP;
use serde::{Deserialize, Serialize};

const NO_SYMBOL: u8 = u8::MAX;

/// Column-against-column score used by the profile aligner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProfileScoreFunction {
    /// Expected substitution score of the residue distributions
    #[default]
    InnerProduct,
    /// Inner product scaled by the non-gap fraction of both columns
    WeightedInnerProduct,
    /// Distance between the residue distributions mapped onto the matrix range
    WeightedEuclideanDistance,
    /// Jensen-Shannon divergence mapped onto the matrix range
    JensenShannonDivergence,
}

/// Profile aligner implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProfileAlignerKind {
    #[default]
    NeedlemanWunsch,
}

/// Residue alphabet of one run with its substitution table
#[derive(Debug, Clone)]
pub struct ScoreContext {
    symbols: Vec<u8>,
    index: [u8; 256],
    substitution: Vec<f64>,
    /// Mean score of identical residues
    high: f64,
    /// Mean score of different residues
    low: f64,
}

impl ScoreContext {
    /// Build the table over every residue occurring in `rows`
    pub fn new<'a, I>(rows: I, matrix: &SimilarityMatrix) -> Result<Self>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut seen = [false; 256];
        for row in rows {
            for &s in row {
                if s != GAP {
                    seen[s.to_ascii_uppercase() as usize] = true;
                }
            }
        }
        let symbols: Vec<u8> = (0u8..=255).filter(|&s| seen[s as usize]).collect();
        if symbols.is_empty() {
            return Err(Error::empty_input("residues to align"));
        }
        if symbols.len() >= NO_SYMBOL as usize {
            return Err(Error::invalid_argument("too many distinct residues"));
        }

        let mut index = [NO_SYMBOL; 256];
        for (i, &s) in symbols.iter().enumerate() {
            index[s as usize] = i as u8;
            index[s.to_ascii_lowercase() as usize] = i as u8;
        }

        let n = symbols.len();
        let mut substitution = Vec::with_capacity(n * n);
        let (mut same, mut different) = (0.0, 0.0);
        for &x in &symbols {
            for &y in &symbols {
                let score = matrix.score(x, y)? as f64;
                if x == y {
                    same += score;
                } else {
                    different += score;
                }
                substitution.push(score);
            }
        }
        let high = same / n as f64;
        let low = if n > 1 {
            different / (n * (n - 1)) as f64
        } else {
            high
        };
        Ok(Self {
            symbols,
            index,
            substitution,
            high,
            low,
        })
    }

    pub fn symbols(&self) -> &[u8] {
        &self.symbols
    }

    #[inline]
    fn substitution(&self, x: usize, y: usize) -> f64 {
        self.substitution[x * self.symbols.len() + y]
    }
}

/// A set of aligned rows; `members` are the input indices of the rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub members: Vec<usize>,
    pub rows: Vec<Vec<u8>>,
}

impl Block {
    pub fn single(member: usize, symbols: Vec<u8>) -> Self {
        Self {
            members: vec![member],
            rows: vec![symbols],
        }
    }

    /// Number of columns
    pub fn width(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    /// Remove columns that are gaps in every row
    pub fn drop_gap_columns(&mut self) {
        let width = self.width();
        let keep: Vec<bool> = (0..width)
            .map(|c| self.rows.iter().any(|row| row[c] != GAP))
            .collect();
        for row in &mut self.rows {
            let mut c = 0;
            row.retain(|_| {
                let kept = keep[c];
                c += 1;
                kept
            });
        }
    }

    /// Rows reordered by member index
    pub fn into_sorted_rows(self) -> Vec<Vec<u8>> {
        let mut paired: Vec<(usize, Vec<u8>)> = self.members.into_iter().zip(self.rows).collect();
        paired.sort_by_key(|(member, _)| *member);
        paired.into_iter().map(|(_, row)| row).collect()
    }
}

/// Per-column residue frequencies
struct Profile {
    /// `width * symbols` frequencies, row-major by column
    frequencies: Vec<f64>,
    /// Non-gap fraction per column
    occupancy: Vec<f64>,
    symbols: usize,
}

impl Profile {
    fn new(block: &Block, context: &ScoreContext) -> Self {
        let n = context.symbols.len();
        let width = block.width();
        let rows = block.rows.len().max(1) as f64;
        let mut frequencies = vec![0.0; width * n];
        let mut occupancy = vec![0.0; width];
        for row in &block.rows {
            for (c, &s) in row.iter().enumerate() {
                let code = context.index[s as usize];
                if s != GAP && code != NO_SYMBOL {
                    frequencies[c * n + code as usize] += 1.0 / rows;
                    occupancy[c] += 1.0 / rows;
                }
            }
        }
        Self {
            frequencies,
            occupancy,
            symbols: n,
        }
    }

    fn column(&self, c: usize) -> &[f64] {
        &self.frequencies[c * self.symbols..(c + 1) * self.symbols]
    }

    /// Residue distribution of a column, conditioned on not being a gap
    fn conditional(&self, c: usize) -> Vec<f64> {
        let w = self.occupancy[c];
        self.column(c)
            .iter()
            .map(|&f| if w > 0.0 { f / w } else { 0.0 })
            .collect()
    }

    /// Expected substitution score of each residue against each column
    fn expected(&self, context: &ScoreContext) -> Vec<f64> {
        let n = self.symbols;
        let width = self.occupancy.len();
        let mut expected = vec![0.0; width * n];
        for c in 0..width {
            let q = self.conditional(c);
            for x in 0..n {
                expected[c * n + x] = (0..n).map(|y| q[y] * context.substitution(x, y)).sum();
            }
        }
        expected
    }
}

fn jensen_shannon(p: &[f64], q: &[f64]) -> f64 {
    let kl = |a: &[f64], m: &[f64]| -> f64 {
        a.iter()
            .zip(m)
            .filter(|(&x, _)| x > 0.0)
            .map(|(&x, &y)| x * (x / y).log2())
            .sum()
    };
    let m: Vec<f64> = p.iter().zip(q).map(|(x, y)| (x + y) / 2.0).collect();
    (kl(p, &m) + kl(q, &m)) / 2.0
}

/// Column scorer for one pair of profiles
struct ColumnScorer<'a> {
    context: &'a ScoreContext,
    function: ProfileScoreFunction,
    first: Profile,
    second: Profile,
    first_conditional: Vec<Vec<f64>>,
    second_conditional: Vec<Vec<f64>>,
    second_expected: Vec<f64>,
}

impl<'a> ColumnScorer<'a> {
    fn new(
        context: &'a ScoreContext,
        function: ProfileScoreFunction,
        first: &Block,
        second: &Block,
    ) -> Self {
        let first = Profile::new(first, context);
        let second = Profile::new(second, context);
        let first_conditional = (0..first.occupancy.len()).map(|c| first.conditional(c)).collect();
        let second_conditional = (0..second.occupancy.len())
            .map(|c| second.conditional(c))
            .collect();
        let second_expected = second.expected(context);
        Self {
            context,
            function,
            first,
            second,
            first_conditional,
            second_conditional,
            second_expected,
        }
    }

    fn score(&self, i: usize, j: usize) -> f64 {
        let (wa, wb) = (self.first.occupancy[i], self.second.occupancy[j]);
        if wa == 0.0 || wb == 0.0 {
            return 0.0;
        }
        let p = &self.first_conditional[i];
        let q = &self.second_conditional[j];
        let n = self.first.symbols;
        let inner = || -> f64 {
            let expected = &self.second_expected[j * n..(j + 1) * n];
            p.iter().zip(expected).map(|(a, e)| a * e).sum()
        };
        let span = self.context.high - self.context.low;
        match self.function {
            ProfileScoreFunction::InnerProduct => inner(),
            ProfileScoreFunction::WeightedInnerProduct => wa * wb * inner(),
            ProfileScoreFunction::WeightedEuclideanDistance => {
                let distance = p
                    .iter()
                    .zip(q)
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum::<f64>()
                    .sqrt()
                    / std::f64::consts::SQRT_2;
                wa * wb * (self.context.high - span * distance)
            }
            ProfileScoreFunction::JensenShannonDivergence => {
                wa * wb * (self.context.high - span * jensen_shannon(p, q))
            }
        }
    }
}

/// Affine-gap Needleman-Wunsch over two profiles
pub struct ProfileAligner<'a> {
    context: &'a ScoreContext,
    function: ProfileScoreFunction,
    open: f64,
    extend: f64,
    cancel: Option<&'a CancellationToken>,
}

impl<'a> ProfileAligner<'a> {
    pub fn new(
        context: &'a ScoreContext,
        function: ProfileScoreFunction,
        gap_open: i32,
        gap_extension: i32,
        cancel: Option<&'a CancellationToken>,
    ) -> Self {
        Self {
            context,
            function,
            open: gap_open as f64,
            extend: gap_extension as f64,
            cancel,
        }
    }

    /// Align two blocks column-wise and merge them into one
    pub fn align(&self, first: &Block, second: &Block) -> Result<Block> {
        let ops = self.ops(first, second)?;
        Ok(merge(first, second, &ops))
    }

    fn ops(&self, first: &Block, second: &Block) -> Result<Vec<Op>> {
        let (n, m) = (first.width(), second.width());
        if n == 0 || m == 0 {
            return Ok(if n == 0 {
                vec![Op::Insert; m]
            } else {
                vec![Op::Delete; n]
            });
        }
        let scorer = ColumnScorer::new(self.context, self.function, first, second);
        let neg = f64::NEG_INFINITY;

        // states: 0 pair, 1 gap in second (consume first), 2 gap in first
        let mut previous = vec![[neg; 3]; m + 1];
        previous[0][0] = 0.0;
        for (j, cell) in previous.iter_mut().enumerate().skip(1) {
            cell[2] = self.open + (j - 1) as f64 * self.extend;
        }
        let mut pointers = vec![0u8; (n + 1) * (m + 1)];
        for j in 2..=m {
            pointers[j] = 2 << 4;
        }

        for i in 1..=n {
            checkpoint(self.cancel)?;
            let mut current = vec![[neg; 3]; m + 1];
            current[0][1] = self.open + (i - 1) as f64 * self.extend;
            if i > 1 {
                pointers[i * (m + 1)] = 1 << 2;
            }
            for j in 1..=m {
                let diag = previous[j - 1];
                let up = previous[j];
                let left = current[j - 1];
                let s = scorer.score(i - 1, j - 1);

                let (pair, from_pair) = best([(diag[0], 0), (diag[1], 1), (diag[2], 2)]);
                let (delete, from_delete) = best([
                    (up[1] + self.extend, 1),
                    (up[0] + self.open, 0),
                    (up[2] + self.open, 2),
                ]);
                let (insert, from_insert) = best([
                    (left[2] + self.extend, 2),
                    (left[0] + self.open, 0),
                    (left[1] + self.open, 1),
                ]);
                current[j] = [pair + s, delete, insert];
                pointers[i * (m + 1) + j] = from_pair | (from_delete << 2) | (from_insert << 4);
            }
            previous = current;
        }

        let end = previous[m];
        let (_, mut state) = best([(end[0], 0), (end[1], 1), (end[2], 2)]);
        let (mut i, mut j) = (n, m);
        let mut ops = Vec::with_capacity(n + m);
        while i > 0 || j > 0 {
            let pointer = pointers[i * (m + 1) + j];
            let from = (pointer >> (2 * state)) & 0b11;
            match state {
                0 if i > 0 && j > 0 => {
                    ops.push(Op::Pair);
                    i -= 1;
                    j -= 1;
                }
                1 if i > 0 => {
                    ops.push(Op::Delete);
                    i -= 1;
                }
                2 if j > 0 => {
                    ops.push(Op::Insert);
                    j -= 1;
                }
                _ => return Err(Error::invalid_argument("profile traceback left the matrix")),
            }
            state = from;
        }
        ops.reverse();
        Ok(ops)
    }
}

/// Highest-scoring candidate; earlier candidates win ties
fn best(candidates: [(f64, u8); 3]) -> (f64, u8) {
    let mut winner = candidates[0];
    for candidate in &candidates[1..] {
        if candidate.0 > winner.0 {
            winner = *candidate;
        }
    }
    winner
}

/// Merge two blocks along a column traceback
fn merge(first: &Block, second: &Block, ops: &[Op]) -> Block {
    let mut rows: Vec<Vec<u8>> = first
        .rows
        .iter()
        .chain(&second.rows)
        .map(|_| Vec::with_capacity(ops.len()))
        .collect();
    let split = first.rows.len();
    let (mut i, mut j) = (0, 0);
    for op in ops {
        let (take_first, take_second) = match op {
            Op::Pair => (true, true),
            Op::Delete => (true, false),
            Op::Insert => (false, true),
        };
        for (row, source) in rows[..split].iter_mut().zip(&first.rows) {
            row.push(if take_first { source[i] } else { GAP });
        }
        for (row, source) in rows[split..].iter_mut().zip(&second.rows) {
            row.push(if take_second { source[j] } else { GAP });
        }
        i += take_first as usize;
        j += take_second as usize;
    }
    Block {
        members: first.members.iter().chain(&second.members).copied().collect(),
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(rows: &[&str]) -> ScoreContext {
        ScoreContext::new(rows.iter().map(|r| r.as_bytes()), &SimilarityMatrix::diagonal(2, -1))
            .unwrap()
    }

    #[test]
    fn test_score_context() {
        let ctx = context(&["ACGT", "acg-"]);
        assert_eq!(ctx.symbols(), b"ACGT");
        assert_eq!(ctx.high, 2.0);
        assert_eq!(ctx.low, -1.0);
    }

    #[test]
    fn test_single_rows_align_like_pairwise() {
        let ctx = context(&["GATTACA", "GATACA"]);
        let aligner = ProfileAligner::new(&ctx, ProfileScoreFunction::InnerProduct, -3, -1, None);
        let merged = aligner
            .align(&Block::single(0, b"GATTACA".to_vec()), &Block::single(1, b"GATACA".to_vec()))
            .unwrap();
        assert_eq!(merged.members, vec![0, 1]);
        assert_eq!(merged.width(), 7);
        assert_eq!(merged.rows[0], b"GATTACA".to_vec());
        let gaps = merged.rows[1].iter().filter(|&&s| s == GAP).count();
        assert_eq!(gaps, 1);
        let ungapped: Vec<u8> = merged.rows[1].iter().copied().filter(|&s| s != GAP).collect();
        assert_eq!(ungapped, b"GATACA".to_vec());
    }

    #[test]
    fn test_profile_against_profile() {
        let ctx = context(&["ACGT", "ACG", "CGT"]);
        let aligner =
            ProfileAligner::new(&ctx, ProfileScoreFunction::WeightedInnerProduct, -4, -1, None);
        let left = Block {
            members: vec![2, 0],
            rows: vec![b"ACGT".to_vec(), b"ACG-".to_vec()],
        };
        let merged = aligner.align(&left, &Block::single(1, b"CGT".to_vec())).unwrap();
        assert_eq!(merged.members, vec![2, 0, 1]);
        assert_eq!(merged.rows[2], b"-CGT".to_vec());
        assert_eq!(merged.into_sorted_rows()[0], b"ACG-".to_vec());
    }

    #[test]
    fn test_score_functions_agree_on_identity() {
        let ctx = context(&["ACGT"]);
        for function in [
            ProfileScoreFunction::InnerProduct,
            ProfileScoreFunction::WeightedInnerProduct,
            ProfileScoreFunction::WeightedEuclideanDistance,
            ProfileScoreFunction::JensenShannonDivergence,
        ] {
            let block = Block::single(0, b"ACGT".to_vec());
            let scorer = ColumnScorer::new(&ctx, function, &block, &block);
            assert!((scorer.score(0, 0) - 2.0).abs() < 1e-12, "{:?}", function);
            assert!(scorer.score(0, 1) < scorer.score(0, 0), "{:?}", function);
        }
    }

    #[test]
    fn test_jensen_shannon_bounds() {
        assert!(jensen_shannon(&[0.5, 0.5], &[0.5, 0.5]).abs() < 1e-12);
        assert!((jensen_shannon(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_drop_gap_columns() {
        let mut block = Block {
            members: vec![0, 1],
            rows: vec![b"A-C-".to_vec(), b"A-G-".to_vec()],
        };
        block.drop_gap_columns();
        assert_eq!(block.rows, vec![b"AC".to_vec(), b"AG".to_vec()]);
    }
}
