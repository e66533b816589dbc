//! NUCmer command - anchor-based alignment of queries against a reference

use anyhow::{Context, Result};
use clap::Args;
use seqweave_core::{MatchMode, Nucmer};
use std::io::Write;
use std::path::PathBuf;

use super::align::write_alignment;
use super::OutputArgs;
use crate::config::Config;
use crate::io::{self, OutputFormat};

#[derive(Args, Debug)]
pub struct NucmerArgs {
    /// Reference sequence file; every record is a reference
    pub reference: PathBuf,

    /// Query sequence file (FASTA/FASTQ)
    pub query: PathBuf,

    /// Minimum MUM length
    #[arg(short = 'l', long)]
    pub min_match_length: Option<usize>,

    /// Require anchors to be unique in the query too
    #[arg(long)]
    pub mum: bool,

    /// One alignment per anchor cluster instead of one per reference
    #[arg(long)]
    pub clusters: bool,

    /// Also write the column consensus of every alignment
    #[arg(long)]
    pub consensus: bool,

    #[command(flatten)]
    pub output: OutputArgs,
}

pub fn execute(config: &Config, args: NucmerArgs) -> Result<()> {
    let mut nucmer_config = config.nucmer.clone();
    if let Some(length) = args.min_match_length {
        nucmer_config.min_match_length = length;
    }
    if args.mum {
        nucmer_config.mode = MatchMode::Mum;
    }
    nucmer_config.clustering |= args.clusters;
    let params = nucmer_config.nucmer_params(config.align.max_matrix_cells)?;

    let references =
        io::read_sequences(&args.reference, None).context("Failed to load reference sequences")?;
    let queries = io::read_sequences(&args.query, None).context("Failed to load query sequences")?;

    let alignments = Nucmer::new(params).align(&references, &queries)?;

    let mut writer = io::create_writer(args.output.out.as_deref())?;
    match args.output.format(config)? {
        OutputFormat::Json => io::write_json(&mut writer, &alignments)?,
        OutputFormat::Fasta => {
            for alignment in &alignments {
                write_alignment(&mut writer, alignment)?;
                if let (true, Some(consensus)) = (args.consensus, &alignment.consensus) {
                    let id = format!("{}_consensus", alignment.second.id);
                    io::write_fasta_record(&mut writer, &id, consensus)?;
                }
            }
        }
    }
    writer.flush()?;
    Ok(())
}
