//! Progressive alignment along a guide tree and tree-dependent refinement

use super::profile::{Block, ProfileAligner};
use super::score::sum_of_pairs;
use super::tree::GuideTree;
use crate::cancel::{checkpoint, CancellationToken};
use crate::error::{Error, Result};
use crate::matrix::SimilarityMatrix;
use rayon::prelude::*;

/// Align `leaves` (indexed like the tree's leaves) bottom-up. Nodes of one
/// tree level are aligned in parallel; results are stored by node id so the
/// outcome does not depend on scheduling. Rows come back in input order.
pub fn progressive(
    tree: &GuideTree,
    leaves: Vec<Block>,
    aligner: &ProfileAligner,
) -> Result<Vec<Vec<u8>>> {
    let mut blocks: Vec<Option<Block>> = leaves.into_iter().map(Some).collect();
    blocks.resize(tree.nodes().len(), None);

    for level in tree.levels() {
        let merged = level
            .par_iter()
            .map(|&id| {
                let (left, right) = tree
                    .node(id)
                    .children
                    .ok_or_else(|| Error::invalid_argument(format!("node {} is a leaf", id)))?;
                match (&blocks[left], &blocks[right]) {
                    (Some(a), Some(b)) => aligner.align(a, b).map(|block| (id, block)),
                    _ => Err(Error::invalid_argument(format!(
                        "children of node {} are not aligned",
                        id
                    ))),
                }
            })
            .collect::<Result<Vec<(usize, Block)>>>()?;
        for (id, block) in merged {
            if let Some((left, right)) = tree.node(id).children {
                blocks[left] = None;
                blocks[right] = None;
            }
            blocks[id] = Some(block);
        }
    }

    blocks[tree.root()]
        .take()
        .map(Block::into_sorted_rows)
        .ok_or_else(|| Error::invalid_argument("guide tree root was not aligned"))
}

/// Settings for [`refine`]
pub struct Refinement<'a> {
    pub iterations: usize,
    pub matrix: &'a SimilarityMatrix,
    pub gap_open: i32,
    pub gap_extension: i32,
    pub cancel: Option<&'a CancellationToken>,
}

/// Split the alignment at every tree edge, realign the two halves and keep
/// the result when the sum-of-pairs score strictly improves. Stops after
/// `iterations` passes or after a pass without improvement.
pub fn refine(
    tree: &GuideTree,
    rows: Vec<Vec<u8>>,
    score: i64,
    aligner: &ProfileAligner,
    settings: &Refinement,
) -> Result<(Vec<Vec<u8>>, i64)> {
    let (mut best_rows, mut best_score) = (rows, score);
    for pass in 0..settings.iterations {
        checkpoint(settings.cancel)?;
        let mut improved = false;
        for edge in tree.edges() {
            let inside = tree.leaves_under(edge);
            if inside.len() == best_rows.len() {
                continue;
            }
            let (mut first, mut second) = split(&best_rows, &inside);
            first.drop_gap_columns();
            second.drop_gap_columns();
            let candidate = aligner.align(&first, &second)?.into_sorted_rows();
            let candidate_score = sum_of_pairs(
                &candidate,
                settings.matrix,
                settings.gap_open,
                settings.gap_extension,
            )?;
            if candidate_score > best_score {
                log::trace!(
                    "Refinement pass {}: edge {} improves {} -> {}",
                    pass,
                    edge,
                    best_score,
                    candidate_score
                );
                best_rows = candidate;
                best_score = candidate_score;
                improved = true;
            }
        }
        if !improved {
            log::debug!("Refinement converged after {} passes", pass + 1);
            break;
        }
    }
    Ok((best_rows, best_score))
}

/// Partition rows into the members listed in `inside` (ascending) and the rest
fn split(rows: &[Vec<u8>], inside: &[usize]) -> (Block, Block) {
    let mut first = Block {
        members: Vec::new(),
        rows: Vec::new(),
    };
    let mut second = first.clone();
    for (member, row) in rows.iter().enumerate() {
        let target = if inside.binary_search(&member).is_ok() {
            &mut first
        } else {
            &mut second
        };
        target.members.push(member);
        target.rows.push(row.clone());
    }
    (first, second)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msa::distance::{kmer_distance_matrix, DistanceFunction};
    use crate::msa::profile::{ProfileScoreFunction, ScoreContext};
    use crate::msa::tree::UpdateDistanceMethod;
    use crate::types::GAP;

    const SEQUENCES: [&str; 4] = ["GATTACAGATTACA", "GATTACAGATACA", "GATTCAGATTACA", "GATTACAGATTAC"];

    fn setup() -> (GuideTree, ScoreContext, Vec<Block>) {
        let seqs: Vec<&[u8]> = SEQUENCES.iter().map(|s| s.as_bytes()).collect();
        let distances =
            kmer_distance_matrix(&seqs, 3, DistanceFunction::EuclideanDistance, 2, None).unwrap();
        let tree = GuideTree::build(&distances, UpdateDistanceMethod::Average).unwrap();
        let context =
            ScoreContext::new(seqs.iter().copied(), &SimilarityMatrix::diagonal(2, -1)).unwrap();
        let leaves = seqs
            .iter()
            .enumerate()
            .map(|(i, s)| Block::single(i, s.to_vec()))
            .collect();
        (tree, context, leaves)
    }

    fn ungapped(row: &[u8]) -> Vec<u8> {
        row.iter().copied().filter(|&s| s != GAP).collect()
    }

    #[test]
    fn test_progressive_keeps_input_order() {
        let (tree, context, leaves) = setup();
        let aligner = ProfileAligner::new(&context, ProfileScoreFunction::InnerProduct, -3, -1, None);
        let rows = progressive(&tree, leaves, &aligner).unwrap();
        assert_eq!(rows.len(), 4);
        let width = rows[0].len();
        for (row, input) in rows.iter().zip(SEQUENCES) {
            assert_eq!(row.len(), width);
            assert_eq!(ungapped(row), input.as_bytes());
        }
    }

    #[test]
    fn test_refinement_never_lowers_score() {
        let (tree, context, leaves) = setup();
        let matrix = SimilarityMatrix::diagonal(2, -1);
        let aligner = ProfileAligner::new(&context, ProfileScoreFunction::InnerProduct, -3, -1, None);
        let rows = progressive(&tree, leaves, &aligner).unwrap();
        let score = sum_of_pairs(&rows, &matrix, -3, -1).unwrap();
        let settings = Refinement {
            iterations: 3,
            matrix: &matrix,
            gap_open: -3,
            gap_extension: -1,
            cancel: None,
        };
        let (refined, refined_score) = refine(&tree, rows, score, &aligner, &settings).unwrap();
        assert!(refined_score >= score);
        assert_eq!(sum_of_pairs(&refined, &matrix, -3, -1).unwrap(), refined_score);
        for (row, input) in refined.iter().zip(SEQUENCES) {
            assert_eq!(ungapped(row), input.as_bytes());
        }
    }

    #[test]
    fn test_split() {
        let rows = vec![b"A".to_vec(), b"C".to_vec(), b"G".to_vec()];
        let (inside, outside) = split(&rows, &[0, 2]);
        assert_eq!(inside.members, vec![0, 2]);
        assert_eq!(outside.rows, vec![b"C".to_vec()]);
    }
}
