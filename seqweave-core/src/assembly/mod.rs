//! Parallel de novo assembly over a de Bruijn graph
//!
//! Reads are counted into a graph of canonical k-mers, sequencing errors
//! are purged (dangling links, bubbles, optional erosion), simple paths
//! become contigs and mate pairs order contigs into scaffolds.

pub mod clone_library;
pub mod contig;
pub mod graph;
pub mod kmer;
pub mod purge;
pub mod scaffold;

pub use clone_library::{CloneLibrary, CloneLibraryInfo};
pub use contig::{Contig, SimplePathContigBuilder};
pub use graph::DeBruijnGraph;
pub use scaffold::{ContigLink, MatePairMapper, Scaffold, Scaffolder};

use crate::cancel::{checkpoint, CancellationToken};
use crate::error::{Error, Result};
use crate::types::{Alphabet, Sequence};
use kmer::MAX_KMER_LENGTH;
use purge::{erode, DanglingLinksPurger, RedundantPathsPurger};
use serde::{Deserialize, Serialize};

/// Smallest k-mer length the estimate returns
const MIN_ESTIMATED_KMER_LENGTH: usize = 5;

/// Assembler settings. Zero thresholds are derived from the k-mer length or
/// the coverage of the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblerParams {
    /// 0 estimates the length from the reads
    pub kmer_length: usize,
    /// 0 = k + 1
    pub dangling_links_threshold: usize,
    /// 0 = 3 * (k + 1)
    pub redundant_path_length_threshold: usize,
    pub allow_erosion: bool,
    /// 0 = square root of the median coverage
    pub erosion_threshold: u32,
    pub allow_low_coverage_contig_removal: bool,
    /// 0 = square root of the median coverage
    pub contig_coverage_threshold: f64,
    pub clone_library: CloneLibrary,
    /// Minimum mate pairs supporting a contig link
    pub scaffold_redundancy: usize,
    /// Maximum contigs joined into one scaffold
    pub depth: usize,
    /// Reads counted per batch
    pub batch_size: usize,
    pub max_purge_passes: usize,
}

impl Default for AssemblerParams {
    fn default() -> Self {
        Self {
            kmer_length: 0,
            dangling_links_threshold: 0,
            redundant_path_length_threshold: 0,
            allow_erosion: false,
            erosion_threshold: 0,
            allow_low_coverage_contig_removal: false,
            contig_coverage_threshold: 0.0,
            clone_library: CloneLibrary::with_defaults(),
            scaffold_redundancy: 2,
            depth: 10,
            batch_size: 100_000,
            max_purge_passes: 16,
        }
    }
}

impl AssemblerParams {
    pub fn validate(&self) -> Result<()> {
        if self.kmer_length > MAX_KMER_LENGTH {
            return Err(Error::invalid_argument(format!(
                "k-mer length {} exceeds {}",
                self.kmer_length, MAX_KMER_LENGTH
            )));
        }
        if self.batch_size == 0 {
            return Err(Error::invalid_argument("batch size must be positive"));
        }
        if self.max_purge_passes == 0 {
            return Err(Error::invalid_argument("at least one purge pass is required"));
        }
        if self.depth == 0 {
            return Err(Error::invalid_argument("scaffold depth must be positive"));
        }
        if !self.contig_coverage_threshold.is_finite() || self.contig_coverage_threshold < 0.0 {
            return Err(Error::invalid_argument(format!(
                "invalid contig coverage threshold {}",
                self.contig_coverage_threshold
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssemblyStats {
    pub reads: usize,
    /// Reads left out for ambiguity codes or for being shorter than k
    pub skipped_reads: usize,
    pub graph_nodes: usize,
    pub dangling_nodes_removed: usize,
    pub redundant_paths_removed: usize,
    pub eroded_nodes: usize,
    pub low_coverage_nodes_removed: usize,
    pub contig_count: usize,
    pub total_contig_length: usize,
    pub n50: usize,
    pub scaffold_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssemblyResult {
    pub kmer_length: usize,
    pub contigs: Vec<Sequence>,
    pub scaffolds: Vec<Sequence>,
    pub stats: AssemblyStats,
}

pub struct ParallelDeNovoAssembler {
    params: AssemblerParams,
    cancel: Option<CancellationToken>,
}

impl ParallelDeNovoAssembler {
    pub fn new(params: AssemblerParams) -> Self {
        Self {
            params,
            cancel: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn params(&self) -> &AssemblerParams {
        &self.params
    }

    pub fn assemble(&self, reads: &[Sequence]) -> Result<AssemblyResult> {
        self.params.validate()?;
        let cancel = self.cancel.as_ref();
        for read in reads {
            if read.alphabet() != Alphabet::Dna {
                return Err(Error::invalid_sequence(
                    read.id(),
                    format!("{} reads cannot be assembled", read.alphabet()),
                ));
            }
        }

        let k = match self.params.kmer_length {
            0 => estimate_kmer_length(reads),
            k => k,
        };
        let mut stats = AssemblyStats {
            reads: reads.len(),
            ..Default::default()
        };
        let usable: Vec<&Sequence> = reads
            .iter()
            .filter(|read| {
                let usable = !read.has_ambiguity()
                    && !read.symbols().contains(&crate::types::GAP)
                    && read.len() >= k;
                if !usable {
                    log::warn!("Skipping read {}: ambiguous or shorter than {}", read.id(), k);
                }
                usable
            })
            .collect();
        stats.skipped_reads = reads.len() - usable.len();
        if usable.is_empty() {
            log::warn!("No reads left to assemble");
            return Ok(AssemblyResult {
                kmer_length: k,
                contigs: Vec::new(),
                scaffolds: Vec::new(),
                stats,
            });
        }
        log::info!(
            "Assembling {} reads with k = {} ({} skipped)",
            usable.len(),
            k,
            stats.skipped_reads
        );

        let symbols: Vec<&[u8]> = usable.iter().map(|read| read.symbols()).collect();
        let mut graph = DeBruijnGraph::build(&symbols, k, self.params.batch_size, cancel)?;
        stats.graph_nodes = graph.len();

        let dangling = or_default(self.params.dangling_links_threshold, k + 1);
        let redundant = or_default(self.params.redundant_path_length_threshold, 3 * (k + 1));
        let (erosion, coverage) = self.thresholds(&graph);

        stats.dangling_nodes_removed += self.undangle(&mut graph, dangling)?;
        checkpoint(cancel)?;
        stats.redundant_paths_removed = RedundantPathsPurger::new(redundant).purge_to_fixed_point(
            &mut graph,
            self.params.max_purge_passes,
            cancel,
        )?;
        stats.dangling_nodes_removed += DanglingLinksPurger::new(dangling).purge_to_fixed_point(
            &mut graph,
            self.params.max_purge_passes,
            cancel,
        )?;
        if self.params.allow_erosion {
            stats.eroded_nodes = erode(&mut graph, erosion, cancel)?;
        }
        if self.params.allow_low_coverage_contig_removal {
            checkpoint(cancel)?;
            stats.low_coverage_nodes_removed =
                contig::remove_low_coverage_contigs(&mut graph, coverage);
        }

        checkpoint(cancel)?;
        let contigs = SimplePathContigBuilder::new(&graph).build();
        log::info!("Built {} contigs", contigs.len());

        checkpoint(cancel)?;
        let named: Vec<(&str, &[u8])> = usable
            .iter()
            .map(|read| (read.id(), read.symbols()))
            .collect();
        let scaffolder = Scaffolder {
            libraries: &self.params.clone_library,
            redundancy: self.params.scaffold_redundancy,
            depth: self.params.depth,
            kmer_length: k,
        };
        let scaffolds = scaffolder.scaffold(&contigs, &named)?;

        let lengths: Vec<usize> = contigs.iter().map(Contig::len).collect();
        stats.contig_count = contigs.len();
        stats.total_contig_length = lengths.iter().sum();
        stats.n50 = n50(&lengths);
        stats.scaffold_count = scaffolds.len();

        let contigs = contigs
            .into_iter()
            .enumerate()
            .map(|(i, c)| Sequence::dna(format!("contig_{}", i + 1), c.sequence))
            .collect::<Result<Vec<_>>>()?;
        let scaffolds = scaffolds
            .into_iter()
            .enumerate()
            .map(|(i, s)| Sequence::dna(format!("scaffold_{}", i + 1), s.sequence))
            .collect::<Result<Vec<_>>>()?;

        Ok(AssemblyResult {
            kmer_length: k,
            contigs,
            scaffolds,
            stats,
        })
    }

    /// Remove dangling links with growing length thresholds so short tips
    /// go first, then at the full threshold until nothing changes
    fn undangle(&self, graph: &mut DeBruijnGraph, threshold: usize) -> Result<usize> {
        let cancel = self.cancel.as_ref();
        let mut removed = 0;
        for length in 1..threshold {
            checkpoint(cancel)?;
            removed += DanglingLinksPurger::new(length).purge(graph);
        }
        removed += DanglingLinksPurger::new(threshold).purge_to_fixed_point(
            graph,
            self.params.max_purge_passes,
            cancel,
        )?;
        log::debug!("Dangling link purge removed {} nodes", removed);
        Ok(removed)
    }

    /// Erosion and contig coverage thresholds; estimated values are the
    /// rounded square root of the median coverage, at least 2
    fn thresholds(&self, graph: &DeBruijnGraph) -> (u32, f64) {
        let estimate = || estimate_coverage_threshold(graph);
        let erosion = match self.params.erosion_threshold {
            0 if self.params.allow_erosion => estimate(),
            t => t,
        };
        let coverage = if self.params.contig_coverage_threshold > 0.0 {
            self.params.contig_coverage_threshold
        } else if self.params.allow_low_coverage_contig_removal {
            estimate() as f64
        } else {
            0.0
        };
        (erosion, coverage)
    }
}

fn or_default(value: usize, default: usize) -> usize {
    if value == 0 {
        default
    } else {
        value
    }
}

/// At least half the longest read and at most the shortest read, clamped
/// to the supported range and made odd so no k-mer is its own reverse
/// complement
pub fn estimate_kmer_length(reads: &[Sequence]) -> usize {
    let (Some(shortest), Some(longest)) = (
        reads.iter().map(Sequence::len).min(),
        reads.iter().map(Sequence::len).max(),
    ) else {
        return MIN_ESTIMATED_KMER_LENGTH;
    };
    let half = longest as f64 / 2.0;
    let k = if half < shortest as f64 {
        ((half + shortest as f64) / 2.0).ceil() as usize
    } else {
        shortest
    };
    let k = k.clamp(MIN_ESTIMATED_KMER_LENGTH, MAX_KMER_LENGTH);
    if k % 2 == 0 {
        k - 1
    } else {
        k
    }
}

/// Square root of the median coverage over nodes seen more than twice,
/// rounded; 2 when no node qualifies
pub fn estimate_coverage_threshold(graph: &DeBruijnGraph) -> u32 {
    let mut coverage: Vec<u32> = graph
        .node_ids()
        .map(|id| graph.node(id).coverage)
        .filter(|&c| c > 2)
        .collect();
    if coverage.is_empty() {
        return 2;
    }
    coverage.sort_unstable();
    let mid = coverage.len() / 2;
    let median = if coverage.len() % 2 == 0 {
        (coverage[mid - 1] as f64 + coverage[mid] as f64) / 2.0
    } else {
        coverage[mid] as f64
    };
    (median.sqrt().round() as u32).max(2)
}

/// Length such that contigs at least this long cover half the assembly
pub fn n50(lengths: &[usize]) -> usize {
    let mut sorted = lengths.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    let total: usize = sorted.iter().sum();
    let mut running = 0;
    for length in sorted {
        running += length;
        if running * 2 >= total {
            return length;
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENOME: &str = "GCACGAAACTTGTTGGCCCAGTGTGAATCGTAGGCTACTA";

    /// Overlapping reads over `genome` every `step` bases, alternating strands
    fn tile(genome: &str, length: usize, step: usize) -> Vec<Sequence> {
        (0..=genome.len() - length)
            .step_by(step)
            .enumerate()
            .map(|(i, start)| {
                let read = &genome.as_bytes()[start..start + length];
                let symbols = if i % 2 == 0 {
                    read.to_vec()
                } else {
                    kmer::reverse_complement(read)
                };
                Sequence::dna(format!("read{}", i), symbols).unwrap()
            })
            .collect()
    }

    fn params(k: usize) -> AssemblerParams {
        AssemblerParams {
            kmer_length: k,
            ..Default::default()
        }
    }

    fn rc(sequence: &[u8]) -> Vec<u8> {
        kmer::reverse_complement(sequence)
    }

    #[test]
    fn test_assembles_single_contig() {
        let reads = tile(GENOME, 16, 2);
        let result = ParallelDeNovoAssembler::new(params(7)).assemble(&reads).unwrap();
        assert_eq!(result.kmer_length, 7);
        assert_eq!(result.contigs.len(), 1);
        let contig = result.contigs[0].symbols();
        assert!(contig == GENOME.as_bytes() || contig == rc(GENOME.as_bytes()).as_slice());
        assert_eq!(result.scaffolds.len(), 1);
        assert_eq!(result.scaffolds[0].symbols(), contig);
        assert_eq!(result.stats.n50, GENOME.len());
        assert_eq!(result.stats.skipped_reads, 0);
    }

    #[test]
    fn test_error_tip_is_purged() {
        let mut reads = tile(GENOME, 16, 2);
        // a read ending in a sequencing error
        reads.push(Sequence::dna("error", &GENOME.as_bytes()[10..21]).unwrap());
        let mut bad = GENOME.as_bytes()[10..21].to_vec();
        bad[10] = b'A';
        reads.push(Sequence::dna("error2", bad).unwrap());
        let result = ParallelDeNovoAssembler::new(params(7)).assemble(&reads).unwrap();
        assert_eq!(result.contigs.len(), 1);
        assert_eq!(result.contigs[0].len(), GENOME.len());
    }

    #[test]
    fn test_no_reads_give_no_contigs() {
        let result = ParallelDeNovoAssembler::new(params(0)).assemble(&[]).unwrap();
        assert!(result.contigs.is_empty());
        assert!(result.scaffolds.is_empty());

        let ambiguous = vec![Sequence::dna("n", "ACGTNACGTACGT").unwrap()];
        let result = ParallelDeNovoAssembler::new(params(5)).assemble(&ambiguous).unwrap();
        assert!(result.contigs.is_empty());
        assert_eq!(result.stats.skipped_reads, 1);
    }

    #[test]
    fn test_rejects_non_dna_reads() {
        let reads = vec![Sequence::protein("p", "MKVLW").unwrap()];
        let err = ParallelDeNovoAssembler::new(params(5)).assemble(&reads).unwrap_err();
        assert!(matches!(err, Error::InvalidSequence { .. }));
        assert!(ParallelDeNovoAssembler::new(params(40)).assemble(&[]).is_err());
    }

    #[test]
    fn test_output_does_not_depend_on_thread_count() {
        let reads = tile(GENOME, 12, 1);
        let run = |threads: usize| {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .unwrap();
            pool.install(|| {
                let mut p = params(7);
                p.batch_size = 5;
                ParallelDeNovoAssembler::new(p).assemble(&reads).unwrap()
            })
        };
        let one = run(1);
        let four = run(4);
        assert_eq!(one.contigs, four.contigs);
        assert_eq!(one.scaffolds, four.scaffolds);
        assert_eq!(one.stats, four.stats);
    }

    #[test]
    fn test_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let reads = tile(GENOME, 16, 2);
        let err = ParallelDeNovoAssembler::new(params(7))
            .with_cancellation(token)
            .assemble(&reads)
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn test_estimate_kmer_length() {
        let reads = |lengths: &[usize]| -> Vec<Sequence> {
            lengths
                .iter()
                .map(|&n| Sequence::dna("r", vec![b'A'; n]).unwrap())
                .collect()
        };
        // half of 40 is below 30: ceil((20 + 30) / 2) = 25
        assert_eq!(estimate_kmer_length(&reads(&[30, 40])), 25);
        // shortest read is the hard limit, made odd
        assert_eq!(estimate_kmer_length(&reads(&[10, 100])), 9);
        assert_eq!(estimate_kmer_length(&reads(&[200, 200])), 31);
        assert_eq!(estimate_kmer_length(&reads(&[3])), 5);
        assert_eq!(estimate_kmer_length(&[]), 5);
    }

    #[test]
    fn test_coverage_threshold() {
        let genome = GENOME.as_bytes();
        let reads: Vec<&[u8]> = vec![genome; 9];
        let graph = DeBruijnGraph::build(&reads, 7, 4, None).unwrap();
        assert_eq!(estimate_coverage_threshold(&graph), 3);
        let once: Vec<&[u8]> = vec![genome];
        let graph = DeBruijnGraph::build(&once, 7, 4, None).unwrap();
        assert_eq!(estimate_coverage_threshold(&graph), 2);
    }

    #[test]
    fn test_n50() {
        assert_eq!(n50(&[2, 3, 4, 5, 6]), 5);
        assert_eq!(n50(&[10]), 10);
        assert_eq!(n50(&[]), 0);
    }
}
