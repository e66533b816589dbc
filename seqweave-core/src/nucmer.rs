//! Anchor-based nucleotide alignment (NUCmer)
//!
//! Queries are matched against every reference at once by MUM search. The
//! anchors of each query/reference pair are chained, the regions between
//! consecutive anchors are closed with Needleman-Wunsch, and exact anchor
//! columns and DP columns are spliced into one alignment. With clustering
//! enabled each cluster of anchors yields its own alignment over the
//! cluster's span instead.

use crate::align::{AlignerParams, NeedlemanWunsch, PairwiseAligner};
use crate::cancel::{checkpoint, CancellationToken};
use crate::chain::{Chain, ChainParams, Chainer};
use crate::cluster::{ClusterBuilder, ClusterParams};
use crate::error::{Error, Result};
use crate::matrix::SimilarityMatrix;
use crate::mummer::{MatchMode, MumFinder, MumParams};
use crate::types::{
    nucleotide_code, nucleotide_mask, AlignedSequence, Alphabet, Anchor, PairwiseAlignment,
    Sequence, GAP,
};
use rayon::prelude::*;
use std::sync::Arc;

/// Parameters for [`Nucmer`]
#[derive(Debug, Clone)]
pub struct NucmerParams {
    /// Minimum MUM length
    pub min_match_length: usize,
    pub mode: MatchMode,
    pub gap_open: i32,
    pub gap_extension: i32,
    pub matrix: Arc<SimilarityMatrix>,
    /// Largest gap-closing DP matrix before the linear-space path is used
    pub max_matrix_cells: usize,
    /// Minimum covered bases for a chain to seed the alignment
    pub min_chain_score: usize,
    /// Cluster anchors and emit one alignment per cluster; `None` aligns
    /// every query/reference pair end to end
    pub clusters: Option<ClusterParams>,
}

impl Default for NucmerParams {
    fn default() -> Self {
        Self {
            min_match_length: 20,
            mode: MatchMode::MumReference,
            gap_open: -13,
            gap_extension: -8,
            matrix: Arc::new(SimilarityMatrix::diagonal(1, -1)),
            max_matrix_cells: AlignerParams::default().max_matrix_cells,
            min_chain_score: 1,
            clusters: None,
        }
    }
}

impl NucmerParams {
    fn aligner_params(&self) -> AlignerParams {
        AlignerParams {
            gap_open: self.gap_open,
            gap_extension: self.gap_extension,
            matrix: Arc::clone(&self.matrix),
            max_matrix_cells: self.max_matrix_cells,
            max_alignments: 1,
        }
    }
}

/// How chains become alignments
enum Backbone {
    Global(Chainer),
    Clustered(ClusterBuilder),
}

/// Per-call state shared by the query workers
struct Workers<'a> {
    references: &'a [Sequence],
    aligner: NeedlemanWunsch,
    backbone: Backbone,
}

/// Anchor-based aligner for DNA/RNA
#[derive(Debug, Clone, Default)]
pub struct Nucmer {
    params: NucmerParams,
    cancel: Option<CancellationToken>,
}

impl Nucmer {
    pub fn new(params: NucmerParams) -> Self {
        Self {
            params,
            cancel: None,
        }
    }

    /// Check `token` between queries and inside the MUM search and DP
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn params(&self) -> &NucmerParams {
        &self.params
    }

    /// Align every query against the references. Results are grouped by
    /// query in input order, then by reference in input order, then by
    /// query offset when clustering. Anchors are unique across all
    /// references together. Queries are processed in parallel.
    pub fn align(
        &self,
        references: &[Sequence],
        queries: &[Sequence],
    ) -> Result<Vec<PairwiseAlignment>> {
        let aligner_params = self.params.aligner_params();
        aligner_params.validate()?;
        if queries.is_empty() {
            return Err(Error::empty_input("query collection"));
        }
        for seq in references.iter().chain(queries) {
            if !seq.alphabet().is_nucleotide() {
                return Err(Error::invalid_argument(format!(
                    "NUCmer aligns DNA or RNA only, {} is {}",
                    seq.id(),
                    seq.alphabet()
                )));
            }
        }

        let mut finder = MumFinder::new(
            references,
            MumParams {
                min_length: self.params.min_match_length,
                mode: self.params.mode,
            },
        )?;
        let mut aligner = NeedlemanWunsch::new(aligner_params);
        if let Some(token) = &self.cancel {
            finder = finder.with_cancellation(token.clone());
            aligner = aligner.with_cancellation(token.clone());
        }
        let chain_params = ChainParams {
            min_score: self.params.min_chain_score,
        };
        let backbone = match &self.params.clusters {
            Some(clusters) => Backbone::Clustered(ClusterBuilder::new(clusters.clone(), chain_params)),
            None => Backbone::Global(Chainer::new(chain_params)),
        };

        log::info!(
            "Aligning {} queries against {} references ({} bp)",
            queries.len(),
            references.len(),
            references.iter().map(Sequence::len).sum::<usize>()
        );
        let batch: Vec<&Sequence> = queries.iter().collect();
        let anchors = finder.search(&batch)?;
        let workers = Workers {
            references,
            aligner,
            backbone,
        };

        let per_query = queries
            .par_iter()
            .zip(anchors.par_iter())
            .map(|(query, per_reference)| self.align_query(&workers, query, per_reference))
            .collect::<Result<Vec<_>>>()?;
        Ok(per_query.into_iter().flatten().collect())
    }

    fn align_query(
        &self,
        workers: &Workers<'_>,
        query: &Sequence,
        per_reference: &[Vec<Anchor>],
    ) -> Result<Vec<PairwiseAlignment>> {
        checkpoint(self.cancel.as_ref())?;
        let aligner = &workers.aligner;
        let mut alignments = Vec::new();

        for (reference, anchors) in workers.references.iter().zip(per_reference) {
            aligner.params().check_inputs(reference, query)?;
            if anchors.is_empty() {
                continue;
            }
            match &workers.backbone {
                Backbone::Global(chainer) => match chainer.chain(query.id(), anchors) {
                    Ok(chain) => {
                        let end = (reference.len(), query.len());
                        alignments.push(self.spliced(aligner, reference, query, &chain, (0, 0), end)?);
                    }
                    Err(Error::NoAnchorsFound { .. }) => {}
                    Err(err) => return Err(err),
                },
                Backbone::Clustered(builder) => {
                    for chain in builder.build(query.id(), anchors) {
                        let (Some(first), Some(last)) = (chain.anchors.first(), chain.anchors.last())
                        else {
                            continue;
                        };
                        let start = (first.reference_start, first.query_start);
                        let end = (last.reference_end(), last.query_end());
                        alignments.push(self.spliced(aligner, reference, query, &chain, start, end)?);
                    }
                }
            }
        }

        if alignments.is_empty() {
            let err = Error::NoAnchorsFound {
                query: query.id().to_string(),
            };
            log::warn!("{}; falling back to full Needleman-Wunsch", err);
            for reference in workers.references {
                let mut alignment = aligner
                    .align(reference, query)?
                    .pop()
                    .ok_or_else(|| Error::empty_input(format!("alignment of {}", query.id())))?;
                alignment.consensus = Some(consensus(
                    &alignment.first.symbols,
                    &alignment.second.symbols,
                    reference.alphabet(),
                ));
                alignments.push(alignment);
            }
        }
        Ok(alignments)
    }

    /// Align `reference[start.0..end.0]` with `query[start.1..end.1]` over
    /// the chain's anchors
    fn spliced(
        &self,
        aligner: &NeedlemanWunsch,
        reference: &Sequence,
        query: &Sequence,
        chain: &Chain,
        start: (usize, usize),
        end: (usize, usize),
    ) -> Result<PairwiseAlignment> {
        let (top, bottom) = self.splice(
            aligner,
            reference.symbols(),
            query.symbols(),
            chain,
            start,
            end,
        )?;
        let score = crate::align::score_columns(
            &top,
            &bottom,
            &self.params.matrix,
            self.params.gap_open,
            self.params.gap_extension,
        )?;
        log::debug!(
            "Query {} on {}: {} anchors, {} columns, score {}",
            query.id(),
            reference.id(),
            chain.len(),
            top.len(),
            score
        );

        let consensus = consensus(&top, &bottom, reference.alphabet());
        Ok(PairwiseAlignment {
            first: AlignedSequence::new(reference.id(), top, start.0),
            second: AlignedSequence::new(query.id(), bottom, start.1),
            score,
            gap_open: self.params.gap_open,
            gap_extension: self.params.gap_extension,
            consensus: Some(consensus),
            anchors: chain.anchors.clone(),
        })
    }

    /// Interleave exact anchor columns with NW alignments of the regions
    /// between them, including the regions from `start` to the first anchor
    /// and from the last anchor to `end`
    fn splice(
        &self,
        aligner: &NeedlemanWunsch,
        reference: &[u8],
        query: &[u8],
        chain: &Chain,
        start: (usize, usize),
        end: (usize, usize),
    ) -> Result<(Vec<u8>, Vec<u8>)> {
        let mut top = Vec::with_capacity((end.0 - start.0).max(end.1 - start.1));
        let mut bottom = Vec::with_capacity(top.capacity());
        let (mut r, mut q) = start;

        for anchor in &chain.anchors {
            close_gap(
                aligner,
                &reference[r..anchor.reference_start],
                &query[q..anchor.query_start],
                &mut top,
                &mut bottom,
            )?;
            top.extend_from_slice(&reference[anchor.reference_start..anchor.reference_end()]);
            bottom.extend_from_slice(&query[anchor.query_start..anchor.query_end()]);
            r = anchor.reference_end();
            q = anchor.query_end();
        }
        close_gap(
            aligner,
            &reference[r..end.0],
            &query[q..end.1],
            &mut top,
            &mut bottom,
        )?;
        Ok((top, bottom))
    }
}

fn close_gap(
    aligner: &NeedlemanWunsch,
    reference: &[u8],
    query: &[u8],
    top: &mut Vec<u8>,
    bottom: &mut Vec<u8>,
) -> Result<()> {
    if reference.is_empty() && query.is_empty() {
        return Ok(());
    }
    let (_, upper, lower) = aligner.align_symbols(reference, query)?;
    top.extend(upper);
    bottom.extend(lower);
    Ok(())
}

/// Column consensus of two aligned nucleotide rows: the shared symbol, the
/// IUPAC code covering both symbols, or the non-gap symbol of a gap column
pub fn consensus(first: &[u8], second: &[u8], alphabet: Alphabet) -> Vec<u8> {
    first
        .iter()
        .zip(second)
        .map(|(&a, &b)| match (a == GAP, b == GAP) {
            (true, _) => b,
            (_, true) => a,
            _ if a == b => a,
            _ => nucleotide_code(nucleotide_mask(a) | nucleotide_mask(b), alphabet),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const REFERENCE: &str = "GATTACAGGCTTAACCGTAGCATCGGATCCTAGGAAGTC";

    fn dna(id: &str, s: &str) -> Sequence {
        Sequence::dna(id, s).unwrap()
    }

    fn nucmer(min_match_length: usize) -> Nucmer {
        Nucmer::new(NucmerParams {
            min_match_length,
            ..NucmerParams::default()
        })
    }

    #[test]
    fn test_single_substitution() {
        let query = format!("{}A{}", &REFERENCE[..17], &REFERENCE[18..]);
        let result = nucmer(8)
            .align(&[dna("ref", REFERENCE)], &[dna("q", &query)])
            .unwrap();
        assert_eq!(result.len(), 1);
        let alignment = &result[0];
        assert_eq!(alignment.anchors.len(), 2);
        assert_eq!(alignment.gap_columns(), 0);
        assert_eq!(alignment.mismatches(), 1);
        assert_eq!(alignment.score, 37);
        assert_eq!(alignment.first.ungapped(), REFERENCE.as_bytes());
        assert_eq!(alignment.second.ungapped(), query.as_bytes());
        let consensus = alignment.consensus.as_ref().unwrap();
        // T against A
        assert_eq!(consensus[17], b'W');
    }

    #[test]
    fn test_deletion_is_spliced() {
        let query = format!("{}{}", &REFERENCE[..18], &REFERENCE[21..]);
        let result = nucmer(8)
            .align(&[dna("ref", REFERENCE)], &[dna("q", &query)])
            .unwrap();
        let alignment = &result[0];
        assert_eq!(alignment.len(), REFERENCE.len());
        assert_eq!(alignment.gap_columns(), 3);
        // 36 matches, one gap of length 3
        assert_eq!(alignment.score, 36 - 13 - 8 - 8);
        assert_eq!(alignment.second.ungapped(), query.as_bytes());
        assert!(alignment
            .anchors
            .windows(2)
            .all(|w| w[0].query_end() <= w[1].query_start
                && w[0].reference_end() <= w[1].reference_start));
        let rescored = crate::align::score_columns(
            &alignment.first.symbols,
            &alignment.second.symbols,
            &SimilarityMatrix::diagonal(1, -1),
            -13,
            -8,
        )
        .unwrap();
        assert_eq!(rescored, alignment.score);
    }

    #[test]
    fn test_no_anchors_falls_back_to_needleman_wunsch() {
        let reference = dna("ref", "ACGTTGCA");
        let query = dna("q", "ACGATGCA");
        let result = nucmer(20).align(&[reference.clone()], &[query.clone()]).unwrap();
        let alignment = &result[0];
        assert!(alignment.anchors.is_empty());

        let direct = NeedlemanWunsch::new(NucmerParams::default().aligner_params())
            .align(&reference, &query)
            .unwrap();
        assert_eq!(alignment.score, direct[0].score);
        assert_eq!(alignment.first, direct[0].first);
        assert!(alignment.consensus.is_some());
    }

    #[test]
    fn test_results_follow_query_order() {
        let queries = vec![
            dna("b", &REFERENCE[5..30]),
            dna("a", &REFERENCE[10..39]),
        ];
        let result = nucmer(8).align(&[dna("ref", REFERENCE)], &queries).unwrap();
        let ids: Vec<&str> = result.iter().map(|a| a.second.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        for (alignment, query) in result.iter().zip(&queries) {
            assert_eq!(alignment.second.ungapped(), query.symbols());
            assert_eq!(alignment.first.ungapped(), REFERENCE.as_bytes());
        }
    }

    #[test]
    fn test_rejects_protein_and_empty_queries() {
        let reference = dna("ref", REFERENCE);
        let protein = Sequence::protein("p", "MKVLA").unwrap();
        assert!(matches!(
            nucmer(8).align(&[reference.clone()], &[protein]),
            Err(Error::InvalidArgument { .. })
        ));
        assert!(matches!(
            nucmer(8).align(&[reference], &[]),
            Err(Error::EmptyInput { .. })
        ));
    }

    fn random_dna(len: usize, mut state: u64) -> String {
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                b"ACGT"[(state % 4) as usize] as char
            })
            .collect()
    }

    /// `genome[a]`, then a base breaking both matches, then `genome[b]`
    fn two_segments(genome: &str, a: std::ops::Range<usize>, b: std::ops::Range<usize>) -> String {
        let bytes = genome.as_bytes();
        let spacer = b"ACGT"
            .iter()
            .find(|&&c| c != bytes[a.end] && c != bytes[b.start - 1])
            .copied()
            .unwrap() as char;
        format!("{}{}{}", &genome[a], spacer, &genome[b])
    }

    #[test]
    fn test_queries_are_mapped_to_their_reference() {
        let chr1 = random_dna(300, 5);
        let chr2 = random_dna(200, 17);
        let references = vec![dna("chr1", &chr1), dna("chr2", &chr2)];
        let queries = vec![dna("q1", &chr2[20..180]), dna("q2", &chr1[40..260])];

        let result = nucmer(20).align(&references, &queries).unwrap();
        let pairs: Vec<(&str, &str)> = result
            .iter()
            .map(|a| (a.first.id.as_str(), a.second.id.as_str()))
            .collect();
        assert_eq!(pairs, vec![("chr2", "q1"), ("chr1", "q2")]);
        assert_eq!(result[0].first.ungapped(), chr2.as_bytes());
        assert_eq!(result[0].anchors, vec![Anchor::new(20, 0, 160)]);
        assert_eq!(result[1].first.ungapped(), chr1.as_bytes());
        assert_eq!(result[1].anchors, vec![Anchor::new(40, 0, 220)]);
    }

    #[test]
    fn test_query_spanning_two_references() {
        let chr1 = random_dna(150, 23);
        let chr2 = random_dna(150, 29);
        let references = vec![dna("chr1", &chr1), dna("chr2", &chr2)];
        let query = format!("{}{}", &chr1[100..], &chr2[..60]);

        let result = nucmer(20).align(&references, &[dna("q", &query)]).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].first.id, "chr1");
        assert_eq!(result[0].anchors, vec![Anchor::new(100, 0, 50)]);
        assert_eq!(result[1].first.id, "chr2");
        assert_eq!(result[1].anchors, vec![Anchor::new(0, 50, 60)]);
    }

    #[test]
    fn test_clusters_give_one_alignment_per_region() {
        let genome = random_dna(2000, 31);
        let query = two_segments(&genome, 100..500, 1300..1700);
        let reference = [dna("ref", &genome)];
        let queries = [dna("q", &query)];

        // end to end, both regions share one chain
        let whole = nucmer(20).align(&reference, &queries).unwrap();
        assert_eq!(whole.len(), 1);
        assert_eq!(whole[0].anchors.len(), 2);

        let clustered = Nucmer::new(NucmerParams {
            clusters: Some(ClusterParams::default()),
            ..NucmerParams::default()
        })
        .align(&reference, &queries)
        .unwrap();
        assert_eq!(clustered.len(), 2);
        let spans: Vec<_> = clustered
            .iter()
            .map(|a| (a.first.start, a.first.end, a.second.start, a.second.end))
            .collect();
        assert_eq!(spans, vec![(100, 500, 0, 400), (1300, 1700, 401, 801)]);
        for alignment in &clustered {
            assert_eq!(alignment.gap_columns(), 0);
            assert_eq!(alignment.score, 400);
        }
    }

    #[test]
    fn test_close_clusters_are_bridged() {
        let genome = random_dna(2000, 37);
        let query = two_segments(&genome, 100..500, 1300..1700);
        let clustered = Nucmer::new(NucmerParams {
            clusters: Some(ClusterParams {
                break_length: 1000,
                ..ClusterParams::default()
            }),
            ..NucmerParams::default()
        })
        .align(&[dna("ref", &genome)], &[dna("q", &query)])
        .unwrap();
        assert_eq!(clustered.len(), 1);
        let alignment = &clustered[0];
        assert_eq!((alignment.first.start, alignment.first.end), (100, 1700));
        assert_eq!((alignment.second.start, alignment.second.end), (0, 801));
        assert_eq!(alignment.first.ungapped(), genome[100..1700].as_bytes());
        assert_eq!(alignment.second.ungapped(), query.as_bytes());
    }

    #[test]
    fn test_consensus_codes() {
        assert_eq!(consensus(b"AC-T", b"AGTT", Alphabet::Dna), b"ASTT".to_vec());
        assert_eq!(consensus(b"AC", b"AT", Alphabet::Rna), b"AY".to_vec());
    }
}
