//! Linear-space alignment (Hirschberg divide and conquer with Gotoh states)
//!
//! The first sequence is split at its middle row. A forward pass scores the
//! upper half for every column and end state, a reverse pass scores the lower
//! half for every column and first state, and the best combination fixes a
//! split point. Gap runs crossing the split are charged once. The halves are
//! solved recursively down to small blocks aligned with the full matrix.

use super::dp::{global_full, LocalHit};
use super::{gotoh_cell, local_cell, Cell, Op, Scoring, State, EMPTY_CELL, NEG_INF};
use crate::error::{Error, Result};

/// Blocks at or below this many cells are aligned with the full matrix
const BASE_CELLS: usize = 1 << 12;

/// Optimal global alignment in `O(m)` working memory per level
pub(crate) fn global_linear(a: &[u16], b: &[u16], scoring: &Scoring) -> Result<(i64, Vec<Op>)> {
    let mut ops = Vec::with_capacity(a.len() + b.len());
    solve(a, b, scoring, State::Pair, None, &mut ops)?;
    Ok((score_ops(&ops, a, b, scoring), ops))
}

fn solve(
    a: &[u16],
    b: &[u16],
    scoring: &Scoring,
    start: State,
    end: Option<State>,
    ops: &mut Vec<Op>,
) -> Result<()> {
    let (n, m) = (a.len(), b.len());
    if n == 0 || m == 0 {
        let (op, len) = if n == 0 { (Op::Insert, m) } else { (Op::Delete, n) };
        ops.extend(std::iter::repeat(op).take(len));
        return Ok(());
    }
    if n == 1 || (n + 1).saturating_mul(m + 1) <= BASE_CELLS {
        let (_, block) = global_full(a, b, scoring, start, end)?;
        ops.extend(block);
        return Ok(());
    }

    let mid = n / 2;
    let forward = last_row(&a[..mid], b, scoring, start, None)?;
    let tail: Vec<u16> = a[mid..].iter().rev().copied().collect();
    let reversed: Vec<u16> = b.iter().rev().copied().collect();
    let reverse = last_row(&tail, &reversed, scoring, State::Pair, end)?;

    let rejoin = scoring.extend - scoring.open;
    let mut best = (NEG_INF, 0, State::Pair);
    for j in 0..=m {
        let (upper, lower) = (&forward[j], &reverse[m - j]);
        for s in State::ALL {
            for t in State::ALL {
                let mut score = upper[s as usize].saturating_add(lower[t as usize]);
                if s == t && s != State::Pair {
                    score = score.saturating_add(rejoin);
                }
                if score > best.0 {
                    best = (score, j, s);
                }
            }
        }
    }
    let (score, split, state) = best;
    if score <= NEG_INF {
        return Err(Error::invalid_argument("no admissible split point"));
    }

    solve(&a[..mid], &b[..split], scoring, start, Some(state), ops)?;
    solve(&a[mid..], &b[split..], scoring, state, end, ops)
}

/// Scores of the last row of the Gotoh matrix, keeping a single row.
///
/// `start` is the virtual state before the first column; `first`, when set,
/// restricts the kind of the first column.
fn last_row(
    a: &[u16],
    b: &[u16],
    scoring: &Scoring,
    start: State,
    first: Option<State>,
) -> Result<Vec<Cell>> {
    let m = b.len();
    let (open, extend) = (scoring.open, scoring.extend);
    let allowed = |state: State| first.map_or(true, |f| f == state);
    let mut row: Vec<Cell> = vec![EMPTY_CELL; m + 1];
    row[0][start as usize] = 0;

    for j in 1..=m {
        let (cell, _) = gotoh_cell(&EMPTY_CELL, &EMPTY_CELL, &row[j - 1], 0, open, extend);
        row[j] = cell;
        if j == 1 && !allowed(State::Insert) {
            row[1][State::Insert as usize] = NEG_INF;
        }
    }

    for i in 1..=a.len() {
        scoring.checkpoint()?;
        let mut diag = row[0];
        let (cell, _) = gotoh_cell(&EMPTY_CELL, &row[0], &EMPTY_CELL, 0, open, extend);
        row[0] = cell;
        if i == 1 && !allowed(State::Delete) {
            row[0][State::Delete as usize] = NEG_INF;
        }
        for j in 1..=m {
            let up = row[j];
            let (cell, _) = gotoh_cell(
                &diag,
                &up,
                &row[j - 1],
                scoring.substitution(a[i - 1], b[j - 1]),
                open,
                extend,
            );
            diag = up;
            row[j] = cell;
            if i == 1 && j == 1 && !allowed(State::Pair) {
                row[1][State::Pair as usize] = NEG_INF;
            }
        }
    }
    Ok(row)
}

/// Affine score of a traceback over encoded sequences
fn score_ops(ops: &[Op], a: &[u16], b: &[u16], scoring: &Scoring) -> i64 {
    let (mut i, mut j) = (0, 0);
    let mut previous: Option<Op> = None;
    let mut score = 0;
    for &op in ops {
        score += match op {
            Op::Pair => {
                let s = scoring.substitution(a[i], b[j]);
                i += 1;
                j += 1;
                s
            }
            Op::Delete | Op::Insert => {
                if op == Op::Delete {
                    i += 1;
                } else {
                    j += 1;
                }
                if previous == Some(op) {
                    scoring.extend
                } else {
                    scoring.open
                }
            }
        };
        previous = Some(op);
    }
    score
}

/// Best-scoring local alignment in linear space.
///
/// A forward scan finds the first cell holding the maximum score, a reverse
/// scan from that cell finds where the alignment begins, and the bounded
/// region is aligned globally.
pub(crate) fn local_linear(
    a: &[u16],
    b: &[u16],
    scoring: &Scoring,
    max_matrix_cells: usize,
) -> Result<Option<(i64, LocalHit)>> {
    let (best, end_i, end_j) = best_local_end(a, b, scoring)?;
    if best <= 0 {
        return Ok(None);
    }

    let upper: Vec<u16> = a[..end_i].iter().rev().copied().collect();
    let left: Vec<u16> = b[..end_j].iter().rev().copied().collect();
    let (len_i, len_j) = local_start(&upper, &left, scoring, best)?;
    let (first_start, second_start) = (end_i - len_i, end_j - len_j);

    let region_a = &a[first_start..end_i];
    let region_b = &b[second_start..end_j];
    let cells = (region_a.len() + 1).saturating_mul(region_b.len() + 1);
    let (score, ops) = if cells <= max_matrix_cells {
        global_full(region_a, region_b, scoring, State::Pair, None)?
    } else {
        global_linear(region_a, region_b, scoring)?
    };
    log::debug!(
        "Linear-space local alignment [{}, {}) x [{}, {}) score {}",
        first_start,
        end_i,
        second_start,
        end_j,
        score
    );

    Ok(Some((
        score,
        LocalHit {
            first_start,
            second_start,
            ops,
        },
    )))
}

/// Maximum local score and the first (row-major) cell reaching it
fn best_local_end(a: &[u16], b: &[u16], scoring: &Scoring) -> Result<(i64, usize, usize)> {
    let m = b.len();
    let mut row: Vec<Cell> = vec![EMPTY_CELL; m + 1];
    let mut best = (0, 0, 0);
    for i in 1..=a.len() {
        scoring.checkpoint()?;
        let mut diag = row[0];
        for j in 1..=m {
            let up = row[j];
            let (cell, _) = local_cell(
                &diag,
                &up,
                &row[j - 1],
                scoring.substitution(a[i - 1], b[j - 1]),
                scoring.open,
                scoring.extend,
            );
            diag = up;
            row[j] = cell;
            if cell[0] > best.0 {
                best = (cell[0], i, j);
            }
        }
    }
    Ok(best)
}

/// Length of the reversed prefixes whose pair-bounded alignment reaches
/// `target`; these give the start of the local alignment
fn local_start(a: &[u16], b: &[u16], scoring: &Scoring, target: i64) -> Result<(usize, usize)> {
    let m = b.len();
    let (open, extend) = (scoring.open, scoring.extend);
    let mut row: Vec<Cell> = vec![EMPTY_CELL; m + 1];
    row[0][State::Pair as usize] = 0;

    for i in 1..=a.len() {
        scoring.checkpoint()?;
        let mut diag = row[0];
        let (cell, _) = gotoh_cell(&EMPTY_CELL, &row[0], &EMPTY_CELL, 0, open, extend);
        // the reversed path must open with a pair column
        row[0] = if i == 1 { EMPTY_CELL } else { cell };
        for j in 1..=m {
            let up = row[j];
            let (mut cell, _) = gotoh_cell(
                &diag,
                &up,
                &row[j - 1],
                scoring.substitution(a[i - 1], b[j - 1]),
                open,
                extend,
            );
            diag = up;
            if i == 1 && j == 1 {
                cell[State::Delete as usize] = NEG_INF;
                cell[State::Insert as usize] = NEG_INF;
            }
            row[j] = cell;
            if cell[State::Pair as usize] == target {
                return Ok((i, j));
            }
        }
    }
    Err(Error::invalid_argument(
        "local alignment start not found in reverse scan",
    ))
}
