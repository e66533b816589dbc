//! Full-matrix Gotoh aligners: Needleman-Wunsch and Smith-Waterman

use super::{
    build_alignment, global_ops, gotoh_cell, hirschberg, local_cell, predecessor, AlignerParams,
    Cell, Op, PairwiseAligner, Scoring, State, EMPTY_CELL, NEG_INF, START,
};
use crate::cancel::CancellationToken;
use crate::error::{Error, Result};
use crate::types::{PairwiseAlignment, Sequence};

/// Global alignment over the full traceback matrix.
///
/// `start` is the state the path continues from (a continuing gap pays
/// extension on its first column); `end`, when set, forces the state of the
/// last column.
pub(crate) fn global_full(
    a: &[u16],
    b: &[u16],
    scoring: &Scoring,
    start: State,
    end: Option<State>,
) -> Result<(i64, Vec<Op>)> {
    let (n, m) = (a.len(), b.len());
    let width = m + 1;
    let (open, extend) = (scoring.open, scoring.extend);
    let mut pointers = vec![0u8; (n + 1) * width];
    let mut prev: Vec<Cell> = vec![EMPTY_CELL; width];
    let mut cur: Vec<Cell> = vec![EMPTY_CELL; width];

    prev[0][start as usize] = 0;
    for j in 1..=m {
        let (cell, pointer) = gotoh_cell(&EMPTY_CELL, &EMPTY_CELL, &prev[j - 1], 0, open, extend);
        prev[j] = cell;
        pointers[j] = pointer;
    }

    for i in 1..=n {
        scoring.checkpoint()?;
        let row = i * width;
        let (cell, pointer) = gotoh_cell(&EMPTY_CELL, &prev[0], &EMPTY_CELL, 0, open, extend);
        cur[0] = cell;
        pointers[row] = pointer;
        for j in 1..=m {
            let (cell, pointer) = gotoh_cell(
                &prev[j - 1],
                &prev[j],
                &cur[j - 1],
                scoring.substitution(a[i - 1], b[j - 1]),
                open,
                extend,
            );
            cur[j] = cell;
            pointers[row + j] = pointer;
        }
        std::mem::swap(&mut prev, &mut cur);
    }

    let last = prev[m];
    let state = match end {
        Some(state) => state,
        None => State::ALL
            .into_iter()
            .fold(State::Pair, |best, s| if last[s as usize] > last[best as usize] { s } else { best }),
    };
    let score = last[state as usize];
    if score <= NEG_INF {
        return Err(Error::invalid_argument(
            "no global alignment ends in the requested state",
        ));
    }

    let mut ops = Vec::with_capacity(n + m);
    let (mut i, mut j, mut state) = (n, m, state);
    while i > 0 || j > 0 {
        let from = predecessor(pointers[i * width + j], state);
        ops.push(state.op());
        match state {
            State::Pair if i > 0 && j > 0 => {
                i -= 1;
                j -= 1;
            }
            State::Delete if i > 0 => i -= 1,
            State::Insert if j > 0 => j -= 1,
            _ => return Err(Error::invalid_argument("traceback left the matrix")),
        }
        state = State::from_index(from);
    }
    ops.reverse();
    Ok((score, ops))
}

/// A local alignment found by the traceback
#[derive(Debug, Clone)]
pub(crate) struct LocalHit {
    pub first_start: usize,
    pub second_start: usize,
    pub ops: Vec<Op>,
}

/// Smith-Waterman over the full traceback matrix. Returns the best score and
/// one hit per end cell reaching it (row-major order, at most `max_hits`).
pub(crate) fn local_full(
    a: &[u16],
    b: &[u16],
    scoring: &Scoring,
    max_hits: usize,
) -> Result<(i64, Vec<LocalHit>)> {
    let (n, m) = (a.len(), b.len());
    let width = m + 1;
    let (open, extend) = (scoring.open, scoring.extend);
    let mut pointers = vec![0u8; (n + 1) * width];
    let mut prev: Vec<Cell> = vec![EMPTY_CELL; width];
    let mut cur: Vec<Cell> = vec![EMPTY_CELL; width];
    let mut best = 0i64;
    let mut ends: Vec<(usize, usize)> = Vec::new();

    for i in 1..=n {
        scoring.checkpoint()?;
        let row = i * width;
        cur[0] = EMPTY_CELL;
        for j in 1..=m {
            let (cell, pointer) = local_cell(
                &prev[j - 1],
                &prev[j],
                &cur[j - 1],
                scoring.substitution(a[i - 1], b[j - 1]),
                open,
                extend,
            );
            cur[j] = cell;
            pointers[row + j] = pointer;

            if cell[0] > best {
                best = cell[0];
                ends.clear();
                ends.push((i, j));
            } else if cell[0] == best && best > 0 && ends.len() < max_hits {
                ends.push((i, j));
            }
        }
        std::mem::swap(&mut prev, &mut cur);
    }

    let mut hits = Vec::with_capacity(ends.len());
    for (end_i, end_j) in ends {
        let mut ops = Vec::new();
        let (mut i, mut j, mut state) = (end_i, end_j, State::Pair);
        loop {
            let from = predecessor(pointers[i * width + j], state);
            ops.push(state.op());
            match state {
                State::Pair if i > 0 && j > 0 => {
                    i -= 1;
                    j -= 1;
                    if from == START {
                        break;
                    }
                }
                State::Delete if i > 0 => i -= 1,
                State::Insert if j > 0 => j -= 1,
                _ => return Err(Error::invalid_argument("traceback left the matrix")),
            }
            state = State::from_index(from);
        }
        ops.reverse();
        hits.push(LocalHit {
            first_start: i,
            second_start: j,
            ops,
        });
    }
    Ok((best, hits))
}

/// Global aligner (Needleman-Wunsch with affine gaps)
#[derive(Debug, Clone, Default)]
pub struct NeedlemanWunsch {
    params: AlignerParams,
    cancel: Option<CancellationToken>,
}

impl NeedlemanWunsch {
    pub fn new(params: AlignerParams) -> Self {
        Self {
            params,
            cancel: None,
        }
    }

    /// Check `token` at every matrix row
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn params(&self) -> &AlignerParams {
        &self.params
    }

    /// Globally align two raw symbol slices, either of which may be empty.
    /// Returns the score and the two gapped rows.
    pub fn align_symbols(&self, first: &[u8], second: &[u8]) -> Result<(i64, Vec<u8>, Vec<u8>)> {
        self.params.validate()?;
        let matrix = &self.params.matrix;
        let (a, b) = (matrix.encode(first)?, matrix.encode(second)?);
        let scoring = self.params.scoring(self.cancel.as_ref());
        let (score, ops) = global_ops(&a, &b, &scoring, self.params.max_matrix_cells)?;
        let (top, bottom) = super::render(&ops, first, second);
        Ok((score, top, bottom))
    }
}

impl PairwiseAligner for NeedlemanWunsch {
    fn name(&self) -> &'static str {
        "NeedlemanWunsch"
    }

    fn align(&self, first: &Sequence, second: &Sequence) -> Result<Vec<PairwiseAlignment>> {
        self.params.check_inputs(first, second)?;
        let matrix = &self.params.matrix;
        let (a, b) = (matrix.encode(first.symbols())?, matrix.encode(second.symbols())?);
        let scoring = self.params.scoring(self.cancel.as_ref());

        let (score, ops) = global_ops(&a, &b, &scoring, self.params.max_matrix_cells)?;
        log::debug!(
            "{}: {} x {} aligned in {} columns, score {}",
            self.name(),
            first.len(),
            second.len(),
            ops.len(),
            score
        );
        Ok(vec![build_alignment(&self.params, first, second, 0, 0, &ops, score)])
    }
}

/// Local aligner (Smith-Waterman with affine gaps)
///
/// Within `max_matrix_cells` every co-optimal end is reported, up to
/// `max_alignments`. Past that bound the linear-space path reports the
/// single alignment ending at the first maximum cell.
#[derive(Debug, Clone, Default)]
pub struct SmithWaterman {
    params: AlignerParams,
    cancel: Option<CancellationToken>,
}

impl SmithWaterman {
    pub fn new(params: AlignerParams) -> Self {
        Self {
            params,
            cancel: None,
        }
    }

    /// Check `token` at every matrix row
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn params(&self) -> &AlignerParams {
        &self.params
    }
}

impl PairwiseAligner for SmithWaterman {
    fn name(&self) -> &'static str {
        "SmithWaterman"
    }

    fn align(&self, first: &Sequence, second: &Sequence) -> Result<Vec<PairwiseAlignment>> {
        self.params.check_inputs(first, second)?;
        let matrix = &self.params.matrix;
        let (a, b) = (matrix.encode(first.symbols())?, matrix.encode(second.symbols())?);
        let scoring = self.params.scoring(self.cancel.as_ref());

        let cells = (a.len() + 1).saturating_mul(b.len() + 1);
        let (score, hits) = if cells <= self.params.max_matrix_cells {
            local_full(&a, &b, &scoring, self.params.max_alignments)?
        } else {
            log::debug!(
                "{}: matrix of {} cells exceeds {}, aligning in linear space",
                self.name(),
                cells,
                self.params.max_matrix_cells
            );
            match hirschberg::local_linear(&a, &b, &scoring, self.params.max_matrix_cells)? {
                Some((score, hit)) => (score, vec![hit]),
                None => (0, Vec::new()),
            }
        };

        if hits.is_empty() {
            log::debug!("{}: no positive-scoring local alignment", self.name());
        }
        Ok(hits
            .iter()
            .map(|hit| {
                build_alignment(
                    &self.params,
                    first,
                    second,
                    hit.first_start,
                    hit.second_start,
                    &hit.ops,
                    score,
                )
            })
            .collect())
    }
}
