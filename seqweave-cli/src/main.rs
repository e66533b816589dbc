use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod config;
mod io;

use commands::{
    align::AlignArgs, assemble::AssembleArgs, msa::MsaArgs, mum::MumArgs, nucmer::NucmerArgs,
};
use config::Config;

#[derive(Parser)]
#[command(name = "seqweave")]
#[command(about = "Sequence alignment and de novo assembly")]
#[command(version)]
#[command(long_about = "
seqweave aligns sequences pairwise, against a reference with MUM anchors and
as a multiple alignment, and assembles short reads with a de Bruijn graph.

Examples:
  seqweave align --local a.fa b.fa --matrix blosum62
  seqweave mum ref.fa reads.fa -l 20
  seqweave nucmer ref.fa contigs.fa --format json -o hits.json
  seqweave msa family.fa -o family.aln.fa
  seqweave assemble reads_1.fq.gz reads_2.fq.gz -k 31 --scaffolds scaffolds.fa
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Number of threads to use
    #[arg(short, long, global = true)]
    pub threads: Option<usize>,

    /// Verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Pairwise alignment of every first record against every second record
    Align(AlignArgs),

    /// Maximal unique matches between a reference and query sequences
    Mum(MumArgs),

    /// Anchor-based alignment of query sequences against a reference
    Nucmer(NucmerArgs),

    /// Progressive multiple sequence alignment
    Msa(MsaArgs),

    /// De Bruijn assembly of short reads into contigs and scaffolds
    Assemble(AssembleArgs),

    /// Write the default configuration as TOML
    InitConfig {
        /// Destination file
        #[arg(default_value = config::DEFAULT_CONFIG_FILE)]
        path: PathBuf,

        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

fn setup_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        log::LevelFilter::Error
    } else {
        match verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };

    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp_secs()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let config = Config::load(cli.config.as_deref())?;

    // Command line wins over the configuration file
    let threads = cli.threads.unwrap_or(config.general.threads);
    if threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to set thread count")?;
    }

    match cli.command {
        Commands::Align(args) => commands::align::execute(&config, args)?,
        Commands::Mum(args) => commands::mum::execute(&config, args)?,
        Commands::Nucmer(args) => commands::nucmer::execute(&config, args)?,
        Commands::Msa(args) => commands::msa::execute(&config, args)?,
        Commands::Assemble(args) => commands::assemble::execute(&config, args)?,
        Commands::InitConfig { path, force } => {
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to replace it)", path.display());
            }
            config.save_to_file(&path)?;
            log::info!("Wrote configuration to {}", path.display());
        }
    }

    Ok(())
}
