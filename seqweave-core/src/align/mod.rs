//! Pairwise dynamic-programming alignment
//!
//! Needleman-Wunsch (global) and Smith-Waterman (local) under an affine gap
//! model: a gap of length `L` scores `gap_open + (L - 1) * gap_extension`.
//! Both aligners keep three Gotoh states per cell and switch to a
//! linear-space divide and conquer when the traceback matrix would exceed
//! [`AlignerParams::max_matrix_cells`].

pub mod dp;
pub mod hirschberg;

pub use dp::{NeedlemanWunsch, SmithWaterman};

use crate::cancel::{checkpoint, CancellationToken};
use crate::error::{Error, Result};
use crate::matrix::SimilarityMatrix;
use crate::types::{AlignedSequence, PairwiseAlignment, Sequence, GAP};
use std::sync::Arc;

/// Common interface of the pairwise aligners
pub trait PairwiseAligner: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Align two sequences. Global aligners return exactly one alignment,
    /// local aligners one per co-optimal end cell.
    fn align(&self, first: &Sequence, second: &Sequence) -> Result<Vec<PairwiseAlignment>>;
}

/// Parameters shared by the pairwise aligners
#[derive(Debug, Clone)]
pub struct AlignerParams {
    /// Score of the first column of a gap (non-positive)
    pub gap_open: i32,
    /// Score of each further column of a gap (non-positive)
    pub gap_extension: i32,
    /// Substitution scores
    pub matrix: Arc<SimilarityMatrix>,
    /// Largest traceback matrix, in cells, before the linear-space path is used
    pub max_matrix_cells: usize,
    /// Maximum number of co-optimal local alignments reported
    pub max_alignments: usize,
}

impl Default for AlignerParams {
    fn default() -> Self {
        Self {
            gap_open: -8,
            gap_extension: -1,
            matrix: Arc::new(SimilarityMatrix::default()),
            max_matrix_cells: 1 << 26,
            max_alignments: 16,
        }
    }
}

impl AlignerParams {
    pub fn new(gap_open: i32, gap_extension: i32, matrix: Arc<SimilarityMatrix>) -> Self {
        Self {
            gap_open,
            gap_extension,
            matrix,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.gap_open > 0 || self.gap_extension > 0 {
            return Err(Error::invalid_argument(format!(
                "gap costs must be zero or negative, got open {} and extension {}",
                self.gap_open, self.gap_extension
            )));
        }
        if self.max_alignments == 0 {
            return Err(Error::invalid_argument("max_alignments must be at least 1"));
        }
        Ok(())
    }

    /// Check a pair of inputs against each other and against the matrix.
    /// An empty sequence is an invalid sequence here; `EmptyInput` is kept
    /// for empty collections.
    pub(crate) fn check_inputs(&self, first: &Sequence, second: &Sequence) -> Result<()> {
        self.validate()?;
        for seq in [first, second] {
            if seq.is_empty() {
                return Err(Error::invalid_sequence(seq.id(), "sequence is empty"));
            }
            if !self.matrix.is_compatible(seq.alphabet()) {
                return Err(Error::invalid_argument(format!(
                    "{} sequence {} cannot be scored with matrix {}",
                    seq.alphabet(),
                    seq.id(),
                    self.matrix.name()
                )));
            }
        }
        if !first.alphabet().is_compatible(second.alphabet()) {
            return Err(Error::invalid_argument(format!(
                "cannot align {} sequence {} with {} sequence {}",
                first.alphabet(),
                first.id(),
                second.alphabet(),
                second.id()
            )));
        }
        Ok(())
    }

    pub(crate) fn scoring<'a>(&'a self, cancel: Option<&'a CancellationToken>) -> Scoring<'a> {
        Scoring {
            matrix: &self.matrix,
            open: self.gap_open as i64,
            extend: self.gap_extension as i64,
            cancel,
        }
    }
}

/// One alignment column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    /// Symbol of the first sequence against symbol of the second
    Pair,
    /// Symbol of the first sequence against a gap
    Delete,
    /// Gap against a symbol of the second sequence
    Insert,
}

/// Gotoh state: which kind of column the path ends with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    Pair = 0,
    Delete = 1,
    Insert = 2,
}

impl State {
    pub(crate) const ALL: [State; 3] = [State::Pair, State::Delete, State::Insert];

    pub(crate) fn from_index(index: u8) -> State {
        match index {
            1 => State::Delete,
            2 => State::Insert,
            _ => State::Pair,
        }
    }

    pub(crate) fn op(self) -> Op {
        match self {
            State::Pair => Op::Pair,
            State::Delete => Op::Delete,
            State::Insert => Op::Insert,
        }
    }
}

/// Scores low enough to never win, high enough to never overflow when summed
pub(crate) const NEG_INF: i64 = i64::MIN / 4;

/// Borrowed scoring context for one alignment call
pub(crate) struct Scoring<'a> {
    pub matrix: &'a SimilarityMatrix,
    pub open: i64,
    pub extend: i64,
    pub cancel: Option<&'a CancellationToken>,
}

impl Scoring<'_> {
    #[inline]
    pub(crate) fn substitution(&self, a: u16, b: u16) -> i64 {
        self.matrix.score_codes(a, b) as i64
    }

    #[inline]
    pub(crate) fn checkpoint(&self) -> Result<()> {
        checkpoint(self.cancel)
    }

    /// Affine cost of a gap of `len` columns
    pub(crate) fn gap(&self, len: usize) -> i64 {
        if len == 0 {
            0
        } else {
            self.open + (len as i64 - 1) * self.extend
        }
    }
}

/// Score triple of one DP cell, indexed by [`State`]
pub(crate) type Cell = [i64; 3];

pub(crate) const EMPTY_CELL: Cell = [NEG_INF; 3];

#[inline]
fn pick(candidates: [(i64, u8); 3]) -> (i64, u8) {
    // First candidate wins ties
    let mut best = candidates[0];
    for candidate in &candidates[1..] {
        if candidate.0 > best.0 {
            best = *candidate;
        }
    }
    best
}

/// Gotoh recurrence for one cell. Returns the scores and the packed
/// predecessor states (2 bits per state: Pair, Delete, Insert).
///
/// Ties prefer the diagonal predecessor for pair columns and gap extension
/// over gap opening, which keeps the gap count minimal.
#[inline]
pub(crate) fn gotoh_cell(
    diag: &Cell,
    up: &Cell,
    left: &Cell,
    substitution: i64,
    open: i64,
    extend: i64,
) -> (Cell, u8) {
    let (pair, pair_from) = pick([(diag[0], 0), (diag[1], 1), (diag[2], 2)]);
    let (delete, delete_from) = pick([
        (up[1].saturating_add(extend), 1),
        (up[0].saturating_add(open), 0),
        (up[2].saturating_add(open), 2),
    ]);
    let (insert, insert_from) = pick([
        (left[2].saturating_add(extend), 2),
        (left[0].saturating_add(open), 0),
        (left[1].saturating_add(open), 1),
    ]);
    let pair = if pair <= NEG_INF { NEG_INF } else { pair + substitution };
    (
        [pair, delete.max(NEG_INF), insert.max(NEG_INF)],
        pair_from | (delete_from << 2) | (insert_from << 4),
    )
}

/// Pair predecessor marking the first column of a local alignment
pub(crate) const START: u8 = 3;

/// Smith-Waterman variant of [`gotoh_cell`]: a pair column may start a new
/// path whenever no predecessor carries a positive score
#[inline]
pub(crate) fn local_cell(
    diag: &Cell,
    up: &Cell,
    left: &Cell,
    substitution: i64,
    open: i64,
    extend: i64,
) -> (Cell, u8) {
    let (mut cell, mut pointer) = gotoh_cell(diag, up, left, substitution, open, extend);
    if diag.iter().all(|&v| v <= 0) {
        cell[0] = substitution;
        pointer = (pointer & !0b11) | START;
    }
    (cell, pointer)
}

/// Predecessor of `state` stored in a packed pointer byte
#[inline]
pub(crate) fn predecessor(pointer: u8, state: State) -> u8 {
    (pointer >> (2 * state as u8)) & 0b11
}

/// Gapped rows for a run of operations over `first` and `second`
pub(crate) fn render(ops: &[Op], first: &[u8], second: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let mut top = Vec::with_capacity(ops.len());
    let mut bottom = Vec::with_capacity(ops.len());
    let (mut i, mut j) = (0, 0);
    for op in ops {
        match op {
            Op::Pair => {
                top.push(first[i]);
                bottom.push(second[j]);
                i += 1;
                j += 1;
            }
            Op::Delete => {
                top.push(first[i]);
                bottom.push(GAP);
                i += 1;
            }
            Op::Insert => {
                top.push(GAP);
                bottom.push(second[j]);
                j += 1;
            }
        }
    }
    (top, bottom)
}

/// Score two gapped rows of equal length with the affine gap model.
/// Columns with a gap on both rows are ignored.
pub fn score_columns(
    first: &[u8],
    second: &[u8],
    matrix: &SimilarityMatrix,
    gap_open: i32,
    gap_extension: i32,
) -> Result<i64> {
    if first.len() != second.len() {
        return Err(Error::invalid_argument(format!(
            "aligned rows differ in length ({} vs {})",
            first.len(),
            second.len()
        )));
    }
    let mut score = 0i64;
    let mut previous: Option<State> = None;
    for (&a, &b) in first.iter().zip(second) {
        let state = match (a == GAP, b == GAP) {
            (true, true) => continue,
            (false, false) => {
                score += matrix.score(a, b)? as i64;
                State::Pair
            }
            (false, true) => State::Delete,
            (true, false) => State::Insert,
        };
        if state != State::Pair {
            score += if previous == Some(state) {
                gap_extension as i64
            } else {
                gap_open as i64
            };
        }
        previous = Some(state);
    }
    Ok(score)
}

/// Assemble a [`PairwiseAlignment`] from a traceback
pub(crate) fn build_alignment(
    params: &AlignerParams,
    first: &Sequence,
    second: &Sequence,
    first_start: usize,
    second_start: usize,
    ops: &[Op],
    score: i64,
) -> PairwiseAlignment {
    let (top, bottom) = render(
        ops,
        &first.symbols()[first_start..],
        &second.symbols()[second_start..],
    );
    PairwiseAlignment {
        first: AlignedSequence::new(first.id(), top, first_start),
        second: AlignedSequence::new(second.id(), bottom, second_start),
        score,
        gap_open: params.gap_open,
        gap_extension: params.gap_extension,
        consensus: None,
        anchors: Vec::new(),
    }
}

/// Optimal global alignment of two encoded slices, choosing the full matrix
/// or the linear-space path by size. Either slice may be empty.
pub(crate) fn global_ops(
    a: &[u16],
    b: &[u16],
    scoring: &Scoring,
    max_matrix_cells: usize,
) -> Result<(i64, Vec<Op>)> {
    if a.is_empty() || b.is_empty() {
        let ops = if a.is_empty() {
            vec![Op::Insert; b.len()]
        } else {
            vec![Op::Delete; a.len()]
        };
        return Ok((scoring.gap(ops.len()), ops));
    }
    let cells = (a.len() + 1).saturating_mul(b.len() + 1);
    if cells <= max_matrix_cells {
        dp::global_full(a, b, scoring, State::Pair, None)
    } else {
        log::debug!(
            "Matrix of {} cells exceeds {}, aligning in linear space",
            cells,
            max_matrix_cells
        );
        hirschberg::global_linear(a, b, scoring)
    }
}
