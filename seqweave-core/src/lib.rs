//! Seqweave Core Library
//!
//! Similarity matrices, dynamic-programming pairwise aligners, maximal
//! unique match search, anchor-based (NUCmer) alignment, progressive
//! multiple alignment (PAMSAM) and parallel de Bruijn assembly (PaDeNA).

pub mod error;
pub mod cancel;
pub mod types;
pub mod matrix;
pub mod align;
pub mod mummer;
pub mod chain;
pub mod cluster;
pub mod nucmer;
pub mod msa;
pub mod assembly;

// Re-export commonly used types and functions
pub use error::{Error, Result};
pub use cancel::CancellationToken;
pub use types::{AlignedSequence, Alphabet, Anchor, PairwiseAlignment, Sequence, GAP};
pub use matrix::{SimilarityMatrix, StandardMatrix};
pub use align::{AlignerParams, NeedlemanWunsch, PairwiseAligner, SmithWaterman};
pub use mummer::{AnchorsByReference, MatchMode, MumFinder, MumParams};
pub use chain::{Chain, ChainParams, Chainer};
pub use cluster::{ClusterBuilder, ClusterParams};
pub use nucmer::{Nucmer, NucmerParams};
pub use msa::{MsaParams, MultipleAlignment, PamsamAligner};
pub use assembly::{
    AssemblerParams, AssemblyResult, AssemblyStats, CloneLibrary, ParallelDeNovoAssembler,
};

/// Version information for the seqweave core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
