//! Assemble command - de Bruijn assembly of short reads

use anyhow::{Context, Result};
use clap::Args;
use seqweave_core::{Alphabet, ParallelDeNovoAssembler};
use std::io::Write;
use std::path::PathBuf;

use super::OutputArgs;
use crate::config::Config;
use crate::io::{self, OutputFormat};

#[derive(Args, Debug)]
pub struct AssembleArgs {
    /// Read files (FASTA/FASTQ, optionally gzipped)
    #[arg(required = true)]
    pub reads: Vec<PathBuf>,

    /// k-mer length (0 estimates from the reads)
    #[arg(short, long)]
    pub kmer_length: Option<usize>,

    /// Remove low-coverage tips after purging
    #[arg(long)]
    pub erode: bool,

    /// Drop contigs whose mean coverage is below the threshold
    #[arg(long)]
    pub remove_low_coverage: bool,

    /// Write scaffolds to this file as well
    #[arg(long)]
    pub scaffolds: Option<PathBuf>,

    #[command(flatten)]
    pub output: OutputArgs,
}

pub fn execute(config: &Config, args: AssembleArgs) -> Result<()> {
    let mut params = config.assembly.assembler_params()?;
    if let Some(k) = args.kmer_length {
        params.kmer_length = k;
    }
    params.allow_erosion |= args.erode;
    params.allow_low_coverage_contig_removal |= args.remove_low_coverage;

    let mut reads = Vec::new();
    for path in &args.reads {
        let batch = io::read_sequences(path, Some(Alphabet::Dna))
            .with_context(|| format!("Failed to load reads from {}", path.display()))?;
        reads.extend(batch);
    }

    let result = ParallelDeNovoAssembler::new(params).assemble(&reads)?;
    let stats = &result.stats;
    log::info!(
        "k={}: {} contigs ({} bp, N50 {}), {} scaffolds",
        result.kmer_length,
        stats.contig_count,
        stats.total_contig_length,
        stats.n50,
        stats.scaffold_count
    );

    let format = args.output.format(config)?;
    let mut writer = io::create_writer(args.output.out.as_deref())?;
    match format {
        OutputFormat::Json => io::write_json(&mut writer, &result)?,
        OutputFormat::Fasta => {
            for contig in &result.contigs {
                io::write_fasta_record(&mut writer, contig.id(), contig.symbols())?;
            }
        }
    }
    writer.flush()?;

    if let Some(path) = &args.scaffolds {
        let mut writer = io::create_writer(Some(path))?;
        for scaffold in &result.scaffolds {
            io::write_fasta_record(&mut writer, scaffold.id(), scaffold.symbols())?;
        }
        writer.flush()?;
        log::info!("Wrote {} scaffolds to {}", result.scaffolds.len(), path.display());
    }
    Ok(())
}
