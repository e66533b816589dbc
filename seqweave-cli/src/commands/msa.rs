//! MSA command - progressive multiple alignment

use anyhow::{Context, Result};
use clap::Args;
use seqweave_core::PamsamAligner;
use std::io::Write;
use std::path::PathBuf;

use super::OutputArgs;
use crate::config::Config;
use crate::io::{self, OutputFormat};

#[derive(Args, Debug)]
pub struct MsaArgs {
    /// Sequences to align (FASTA/FASTQ)
    pub input: PathBuf,

    /// Skip the Kimura-distance second stage
    #[arg(long)]
    pub no_stage2: bool,

    /// Refinement passes over the guide tree
    #[arg(long)]
    pub refinement_iterations: Option<usize>,

    #[command(flatten)]
    pub output: OutputArgs,
}

pub fn execute(config: &Config, args: MsaArgs) -> Result<()> {
    let mut params = config.msa.msa_params()?;
    if args.no_stage2 {
        params.use_stage2 = false;
    }
    if let Some(iterations) = args.refinement_iterations {
        params.refinement_iterations = iterations;
    }

    let sequences = io::read_sequences(&args.input, None).context("Failed to load sequences")?;
    let alignment = PamsamAligner::new(params).align(&sequences)?;
    log::info!(
        "Aligned {} sequences in {} columns, sum-of-pairs score {}",
        alignment.sequences.len(),
        alignment.width(),
        alignment.score
    );

    let mut writer = io::create_writer(args.output.out.as_deref())?;
    match args.output.format(config)? {
        OutputFormat::Json => io::write_json(&mut writer, &alignment)?,
        OutputFormat::Fasta => {
            for row in &alignment.sequences {
                io::write_fasta_record(&mut writer, &row.id, &row.symbols)?;
            }
        }
    }
    writer.flush()?;
    Ok(())
}
