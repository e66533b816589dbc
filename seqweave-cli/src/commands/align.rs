//! Align command - pairwise Needleman-Wunsch or Smith-Waterman alignment

use anyhow::{Context, Result};
use clap::Args;
use seqweave_core::{NeedlemanWunsch, PairwiseAligner, PairwiseAlignment, SmithWaterman};
use std::io::Write;
use std::path::PathBuf;

use super::OutputArgs;
use crate::config::Config;
use crate::io::{self, OutputFormat};

#[derive(Args, Debug)]
pub struct AlignArgs {
    /// First sequence file (FASTA/FASTQ)
    pub first: PathBuf,

    /// Second sequence file (FASTA/FASTQ)
    pub second: PathBuf,

    /// Global alignment (default)
    #[arg(long, conflicts_with = "local")]
    pub global: bool,

    /// Local alignment
    #[arg(long)]
    pub local: bool,

    /// Similarity matrix: diagonal, a built-in name or a matrix file
    #[arg(short, long)]
    pub matrix: Option<String>,

    /// Gap open score (zero or negative)
    #[arg(long, allow_hyphen_values = true)]
    pub gap_open: Option<i32>,

    /// Gap extension score (zero or negative)
    #[arg(long, allow_hyphen_values = true)]
    pub gap_extension: Option<i32>,

    #[command(flatten)]
    pub output: OutputArgs,
}

pub fn execute(config: &Config, args: AlignArgs) -> Result<()> {
    let mut align_config = config.align.clone();
    if let Some(matrix) = args.matrix {
        align_config.scoring.matrix = matrix;
    }
    if let Some(gap_open) = args.gap_open {
        align_config.scoring.gap_open = gap_open;
    }
    if let Some(gap_extension) = args.gap_extension {
        align_config.scoring.gap_extension = gap_extension;
    }
    let params = align_config.aligner_params()?;

    let aligner: Box<dyn PairwiseAligner> = if args.local {
        Box::new(SmithWaterman::new(params))
    } else {
        Box::new(NeedlemanWunsch::new(params))
    };
    log::info!("Aligning with {}", aligner.name());

    let first = io::read_sequences(&args.first, None).context("Failed to load first sequences")?;
    let second =
        io::read_sequences(&args.second, None).context("Failed to load second sequences")?;

    let mut alignments: Vec<PairwiseAlignment> = Vec::new();
    for a in &first {
        for b in &second {
            let result = aligner
                .align(a, b)
                .with_context(|| format!("Failed to align {} with {}", a.id(), b.id()))?;
            if result.is_empty() {
                log::warn!("No positive-scoring alignment between {} and {}", a.id(), b.id());
            }
            alignments.extend(result);
        }
    }
    log::info!("Computed {} alignments", alignments.len());

    let mut writer = io::create_writer(args.output.out.as_deref())?;
    match args.output.format(config)? {
        OutputFormat::Json => io::write_json(&mut writer, &alignments)?,
        OutputFormat::Fasta => {
            for alignment in &alignments {
                write_alignment(&mut writer, alignment)?;
            }
        }
    }
    writer.flush()?;
    Ok(())
}

/// Both gapped rows of an alignment as FASTA, with ranges and score in the ids
pub fn write_alignment<W: Write + ?Sized>(
    writer: &mut W,
    alignment: &PairwiseAlignment,
) -> Result<()> {
    for row in [&alignment.first, &alignment.second] {
        let header = format!(
            "{} {}-{} score={}",
            row.id,
            row.start + 1,
            row.end,
            alignment.score
        );
        io::write_fasta_record(writer, &header, &row.symbols)?;
    }
    Ok(())
}
