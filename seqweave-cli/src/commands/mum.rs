//! MUM command - maximal unique matches between a reference and queries

use anyhow::{Context, Result};
use clap::Args;
use seqweave_core::{Alphabet, MatchMode, MumFinder, MumParams};
use std::io::Write;
use std::path::PathBuf;

use super::OutputArgs;
use crate::config::Config;
use crate::io::{self, OutputFormat};

#[derive(Args, Debug)]
pub struct MumArgs {
    /// Reference sequence file; every record is a reference
    pub reference: PathBuf,

    /// Query sequence file (FASTA/FASTQ)
    pub query: PathBuf,

    /// Minimum match length
    #[arg(short = 'l', long)]
    pub min_length: Option<usize>,

    /// Require uniqueness in the reference only
    #[arg(long)]
    pub mumreference: bool,

    #[command(flatten)]
    pub output: OutputArgs,
}

pub fn execute(config: &Config, args: MumArgs) -> Result<()> {
    let mode = if args.mumreference {
        MatchMode::MumReference
    } else {
        config.mum.mode
    };
    let params = MumParams {
        min_length: args.min_length.unwrap_or(config.mum.min_length),
        mode,
    };

    let references = io::read_sequences(&args.reference, Some(Alphabet::Dna))
        .context("Failed to load reference sequences")?;
    let queries = io::read_sequences(&args.query, Some(Alphabet::Dna))
        .context("Failed to load query sequences")?;

    let finder = MumFinder::new(&references, params)?;
    let matches = finder.find_all(&queries)?;

    let mut writer = io::create_writer(args.output.out.as_deref())?;
    match args.output.format(config)? {
        OutputFormat::Json => io::write_json(&mut writer, &matches)?,
        OutputFormat::Fasta => {
            // MUMmer text layout with 1-based positions, queries in input
            // order; the reference id column appears with several references
            let named = references.len() > 1;
            for query in &queries {
                writeln!(writer, "> {}", query.id())?;
                let Some(per_reference) = matches.get(query.id()) else {
                    continue;
                };
                for reference in &references {
                    for anchor in per_reference.get(reference.id()).into_iter().flatten() {
                        if named {
                            write!(writer, "  {}", reference.id())?;
                        }
                        writeln!(
                            writer,
                            "{:>8} {:>8} {:>8}",
                            anchor.reference_start + 1,
                            anchor.query_start + 1,
                            anchor.length
                        )?;
                    }
                }
            }
        }
    }
    writer.flush()?;
    Ok(())
}
