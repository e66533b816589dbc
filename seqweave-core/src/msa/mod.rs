//! Progressive multiple sequence alignment (PAMSAM)
//!
//! Stage 1 builds a guide tree from k-mer distances and aligns profiles
//! bottom-up. Stage 2 (optional) rebuilds the tree from Kimura distances
//! measured on the stage-1 alignment and aligns again, keeping the better
//! result. Refinement then realigns the two halves of every tree edge.

pub mod distance;
pub mod profile;
pub mod progressive;
pub mod score;
pub mod tree;

pub use distance::DistanceFunction;
pub use profile::{ProfileAlignerKind, ProfileScoreFunction};
pub use tree::UpdateDistanceMethod;

use crate::cancel::{checkpoint, CancellationToken};
use crate::error::{Error, Result};
use crate::matrix::SimilarityMatrix;
use crate::types::{AlignedSequence, Sequence, GAP};
use profile::{Block, ProfileAligner, ScoreContext};
use progressive::Refinement;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tree::GuideTree;

/// Parameters for [`PamsamAligner`]
#[derive(Debug, Clone)]
pub struct MsaParams {
    /// k-mer length for stage-1 distances; `None` picks 3 for nucleotides
    /// and 2 for proteins
    pub kmer_length: Option<usize>,
    pub distance: DistanceFunction,
    pub linkage: UpdateDistanceMethod,
    pub profile_aligner: ProfileAlignerKind,
    pub profile_score: ProfileScoreFunction,
    pub matrix: Arc<SimilarityMatrix>,
    pub gap_open: i32,
    pub gap_extension: i32,
    /// Parallelism hint for the distance computations
    pub partitions: usize,
    pub refinement_iterations: usize,
    pub use_stage2: bool,
}

impl Default for MsaParams {
    fn default() -> Self {
        Self {
            kmer_length: None,
            distance: DistanceFunction::default(),
            linkage: UpdateDistanceMethod::default(),
            profile_aligner: ProfileAlignerKind::default(),
            profile_score: ProfileScoreFunction::default(),
            matrix: Arc::new(SimilarityMatrix::diagonal(2, -1)),
            gap_open: -4,
            gap_extension: -1,
            partitions: rayon::current_num_threads(),
            refinement_iterations: 2,
            use_stage2: true,
        }
    }
}

/// Aligned rows in input order plus their sum-of-pairs score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultipleAlignment {
    pub sequences: Vec<AlignedSequence>,
    pub score: i64,
}

impl MultipleAlignment {
    /// Number of columns
    pub fn width(&self) -> usize {
        self.sequences.first().map_or(0, AlignedSequence::len)
    }
}

/// Progressive multiple aligner
#[derive(Debug, Clone, Default)]
pub struct PamsamAligner {
    params: MsaParams,
    cancel: Option<CancellationToken>,
}

impl PamsamAligner {
    pub fn new(params: MsaParams) -> Self {
        Self {
            params,
            cancel: None,
        }
    }

    /// Check `token` between stages, tree levels and refinement passes
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn params(&self) -> &MsaParams {
        &self.params
    }

    /// Align all `sequences`. Input gaps are ignored.
    pub fn align(&self, sequences: &[Sequence]) -> Result<MultipleAlignment> {
        let kmer_length = self.validate(sequences)?;
        let cancel = self.cancel.as_ref();
        let params = &self.params;

        let residues: Vec<Vec<u8>> = sequences
            .iter()
            .map(|s| s.symbols().iter().copied().filter(|&c| c != GAP).collect())
            .collect();
        if let Some(seq) = sequences.iter().zip(&residues).find(|(_, r)| r.is_empty()) {
            return Err(Error::invalid_sequence(seq.0.id(), "no residues"));
        }
        let slices: Vec<&[u8]> = residues.iter().map(Vec::as_slice).collect();

        let context = ScoreContext::new(slices.iter().copied(), &params.matrix)?;
        let aligner = match params.profile_aligner {
            ProfileAlignerKind::NeedlemanWunsch => ProfileAligner::new(
                &context,
                params.profile_score,
                params.gap_open,
                params.gap_extension,
                cancel,
            ),
        };
        let leaves = || -> Vec<Block> {
            residues
                .iter()
                .enumerate()
                .map(|(i, r)| Block::single(i, r.clone()))
                .collect()
        };
        let sum_of_pairs = |rows: &[Vec<u8>]| {
            score::sum_of_pairs(rows, &params.matrix, params.gap_open, params.gap_extension)
        };

        log::info!(
            "Aligning {} sequences (k = {}, {:?}, {:?})",
            sequences.len(),
            kmer_length,
            params.distance,
            params.profile_score
        );

        // stage 1
        let distances = distance::kmer_distance_matrix(
            &slices,
            kmer_length,
            params.distance,
            params.partitions,
            cancel,
        )?;
        let mut tree = GuideTree::build(&distances, params.linkage)?;
        let mut rows = progressive::progressive(&tree, leaves(), &aligner)?;
        let mut score = sum_of_pairs(&rows)?;
        log::debug!("Stage 1 score {}", score);

        if params.use_stage2 {
            checkpoint(cancel)?;
            let distances = distance::kimura_distance_matrix(&rows, params.partitions, cancel)?;
            let stage2_tree = GuideTree::build(&distances, params.linkage)?;
            let stage2_rows = progressive::progressive(&stage2_tree, leaves(), &aligner)?;
            let stage2_score = sum_of_pairs(&stage2_rows)?;
            log::debug!("Stage 2 score {}", stage2_score);
            if stage2_score > score {
                tree = stage2_tree;
                rows = stage2_rows;
                score = stage2_score;
            }
        }

        if params.refinement_iterations > 0 {
            let settings = Refinement {
                iterations: params.refinement_iterations,
                matrix: &params.matrix,
                gap_open: params.gap_open,
                gap_extension: params.gap_extension,
                cancel,
            };
            let (refined, refined_score) =
                progressive::refine(&tree, rows, score, &aligner, &settings)?;
            rows = refined;
            score = refined_score;
        }

        log::info!(
            "Aligned {} sequences in {} columns, sum-of-pairs {}",
            sequences.len(),
            rows.first().map_or(0, Vec::len),
            score
        );
        Ok(MultipleAlignment {
            sequences: sequences
                .iter()
                .zip(rows)
                .map(|(seq, row)| AlignedSequence::new(seq.id(), row, 0))
                .collect(),
            score,
        })
    }

    /// Check the inputs and resolve the k-mer length
    fn validate(&self, sequences: &[Sequence]) -> Result<usize> {
        let params = &self.params;
        if sequences.len() < 2 {
            return Err(Error::InsufficientInput {
                required: 2,
                found: sequences.len(),
            });
        }
        if params.gap_open > 0 || params.gap_extension > 0 {
            return Err(Error::invalid_argument(format!(
                "gap costs must be zero or negative, got open {} and extension {}",
                params.gap_open, params.gap_extension
            )));
        }
        let alphabet = sequences[0].alphabet();
        for seq in sequences {
            if seq.is_empty() {
                return Err(Error::invalid_sequence(seq.id(), "sequence is empty"));
            }
            if !seq.alphabet().is_compatible(alphabet) {
                return Err(Error::invalid_argument(format!(
                    "mixed alphabets: {} is {}, {} is {}",
                    sequences[0].id(),
                    alphabet,
                    seq.id(),
                    seq.alphabet()
                )));
            }
            if !params.matrix.is_compatible(seq.alphabet()) {
                return Err(Error::invalid_argument(format!(
                    "{} sequence {} cannot be scored with matrix {}",
                    seq.alphabet(),
                    seq.id(),
                    params.matrix.name()
                )));
            }
        }
        match params.kmer_length {
            Some(0) => Err(Error::invalid_argument("k-mer length must be positive")),
            Some(k) => Ok(k),
            None if alphabet.is_nucleotide() => Ok(3),
            None => Ok(2),
        }
    }
}
